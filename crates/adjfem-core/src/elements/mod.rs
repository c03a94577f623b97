//! Element models: the physics of an element type, independent of the basis
//! that integrates it.
//!
//! An [`ElementModel`] is called once per quadrature point by an external
//! integrator. It receives the field values and derivatives at the point and
//! returns the coefficients of the weak form, their Jacobian, the adjoint
//! design sensitivity and point-wise quantities of interest.

use crate::error::{check_len, check_min_len, ModelError, Result};
use crate::output::{ElementType, OutputFlags};
use crate::quantity::QuantityType;

pub mod heat_conduction;
pub mod jacobian;
pub mod linear_elasticity;

pub use heat_conduction::HeatConduction2D;
pub use jacobian::{JacobianPattern, JacobianView};
pub use linear_elasticity::LinearElasticity3D;

/// Length of the physical position `x`
pub const NUM_COORDS: usize = 3;

/// Number of time-derivative slots per variable in `ut`: value, d/dt, d²/dt²
pub const NUM_TIME_SLOTS: usize = 3;

/// Data supplied by the basis at one quadrature point.
///
/// Layouts, row-major by variable:
/// - `ut`: `vars_per_node × 3` (value, first and second time derivative)
/// - `ux`: `vars_per_node × (spatial_dim + 1)` (value, then each spatial derivative)
#[derive(Debug, Clone, Copy)]
pub struct EvalPoint<'a> {
    /// Local element index
    pub elem_index: usize,
    /// Simulation time
    pub time: f64,
    /// Quadrature point index
    pub quad_index: usize,
    /// Parametric position of the point
    pub pt: &'a [f64],
    /// Physical position of the point
    pub x: &'a [f64],
    pub ut: &'a [f64],
    pub ux: &'a [f64],
}

/// Spatial dimension and variables per node of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    spatial_dim: usize,
    vars_per_node: usize,
}

impl ModelDims {
    pub fn new(spatial_dim: usize, vars_per_node: usize) -> Result<Self> {
        if !(1..=3).contains(&spatial_dim) || vars_per_node == 0 {
            return Err(ModelError::InvalidDimensions {
                spatial_dim,
                vars_per_node,
            });
        }
        Ok(Self {
            spatial_dim,
            vars_per_node,
        })
    }

    /// Dimensions of a built-in model, known to be valid
    pub(crate) const fn fixed(spatial_dim: usize, vars_per_node: usize) -> Self {
        Self {
            spatial_dim,
            vars_per_node,
        }
    }

    pub fn spatial_dim(&self) -> usize {
        self.spatial_dim
    }

    pub fn vars_per_node(&self) -> usize {
        self.vars_per_node
    }

    pub fn ut_len(&self) -> usize {
        NUM_TIME_SLOTS * self.vars_per_node
    }

    pub fn ux_len(&self) -> usize {
        (self.spatial_dim + 1) * self.vars_per_node
    }

    /// Rows (and columns) per variable in the weak-form Jacobian
    pub fn block_size(&self) -> usize {
        NUM_TIME_SLOTS + self.spatial_dim
    }

    /// Number of rows (and columns) of the weak-form Jacobian
    pub fn jacobian_size(&self) -> usize {
        self.block_size() * self.vars_per_node
    }

    /// Jacobian row/column of time slot `slot` of variable `var`
    pub fn time_index(&self, var: usize, slot: usize) -> usize {
        var * self.block_size() + slot
    }

    /// Jacobian row/column of spatial derivative `dir` of variable `var`
    pub fn spatial_index(&self, var: usize, dir: usize) -> usize {
        var * self.block_size() + NUM_TIME_SLOTS + dir
    }

    /// Offset in `ux`/`DUx` of spatial derivative `dir` of variable `var`
    pub fn ux_index(&self, var: usize, dir: usize) -> usize {
        var * (self.spatial_dim + 1) + 1 + dir
    }
}

/// Derivatives of a quantity of interest with respect to the point data
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitySens {
    /// With respect to the physical position (3)
    pub dfdx: Vec<f64>,
    /// With respect to the position derivatives (9)
    pub dfdxd: Vec<f64>,
    /// With respect to `ut`
    pub dfdut: Vec<f64>,
    /// With respect to `ux`
    pub dfdux: Vec<f64>,
}

impl QuantitySens {
    pub fn new(dims: ModelDims) -> Self {
        Self {
            dfdx: vec![0.0; NUM_COORDS],
            dfdxd: vec![0.0; NUM_COORDS * NUM_COORDS],
            dfdut: vec![0.0; dims.ut_len()],
            dfdux: vec![0.0; dims.ux_len()],
        }
    }

    pub fn clear(&mut self) {
        self.dfdx.fill(0.0);
        self.dfdxd.fill(0.0);
        self.dfdut.fill(0.0);
        self.dfdux.fill(0.0);
    }

    pub(crate) fn check(&self, dims: ModelDims) -> Result<()> {
        check_len("dfdx", self.dfdx.len(), NUM_COORDS)?;
        check_len("dfdxd", self.dfdxd.len(), NUM_COORDS * NUM_COORDS)?;
        check_len("dfdut", self.dfdut.len(), dims.ut_len())?;
        check_len("dfdux", self.dfdux.len(), dims.ux_len())
    }
}

/// Physics descriptor of one element type.
///
/// Evaluation methods take `&self`. They are pure functions of the point
/// data and the current design variables, so they may run concurrently.
/// Design variables change only through `&mut self`.
pub trait ElementModel: Send + Sync {
    fn dims(&self) -> ModelDims;

    /// Spatial dimension: 1, 2 or 3
    fn spatial_dim(&self) -> usize {
        self.dims().spatial_dim()
    }

    fn vars_per_node(&self) -> usize {
        self.dims().vars_per_node()
    }

    /// Output element class this model writes records for
    fn element_type(&self) -> ElementType;

    /// Global design variable numbers; `None` queries the count only
    fn design_var_nums(&self, _elem_index: usize, _dv_nums: Option<&mut [usize]>) -> Result<usize> {
        Ok(0)
    }

    fn set_design_vars(&mut self, _elem_index: usize, _dvs: &[f64]) -> Result<()> {
        Ok(())
    }

    fn design_vars(&self, _elem_index: usize, _dvs: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn design_var_range(&self, _elem_index: usize, _lb: &mut [f64], _ub: &mut [f64]) -> Result<()> {
        Ok(())
    }

    /// Evaluate the coefficients of the weak form at one point.
    ///
    /// `dut` (length `3·vpn`) holds the coefficients of the value and its
    /// time derivatives; `dux` (length `vpn·(dim+1)`) the coefficients of the
    /// value and its spatial derivatives. `dut` depends only on `ut` and
    /// `dux` only on `ux`.
    fn eval_weak_integrand(&self, point: &EvalPoint<'_>, dut: &mut [f64], dux: &mut [f64]) -> Result<()>;

    /// Evaluate the weak-form coefficients and their exact Jacobian.
    ///
    /// The Jacobian is `jacobian_size()` square. For variable `k` its block
    /// starts at `k·(3+dim)`: offsets 0..3 are the value and time derivatives
    /// (rows from `dut`), offsets `3..3+dim` the spatial derivatives (rows from
    /// `dux`). Values are written to `jac` in the order of the returned
    /// pattern.
    fn eval_weak_jacobian(
        &self,
        point: &EvalPoint<'_>,
        dut: &mut [f64],
        dux: &mut [f64],
        jac: &mut [f64],
    ) -> Result<JacobianPattern<'_>>;

    /// Add `scale · (∂R/∂x)ᵀ` to the element-local design sensitivity, where
    /// `R = Σ_k ψ_k (DUt[3k] + DUt[3k+1] + DUt[3k+2] + DUx[k(d+1)]) + Σ ψx · DUx[spatial]`.
    fn add_weak_adj_product(
        &self,
        _point: &EvalPoint<'_>,
        _psi: &[f64],
        _psix: &[f64],
        _scale: f64,
        _fdv_sens: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }

    /// Evaluate a quantity of interest; returns the number of values written,
    /// at most [`QuantityType::MAX_LEN`]
    fn eval_point_quantity(
        &self,
        quantity: QuantityType,
        _point: &EvalPoint<'_>,
        _xd: &[f64],
        _out: &mut [f64],
    ) -> Result<usize> {
        Err(ModelError::UnsupportedQuantity(quantity))
    }

    /// Add `scale · dfdqᵀ · ∂q/∂x` to the element-local design sensitivity
    #[allow(clippy::too_many_arguments)]
    fn add_point_quantity_dv_sens(
        &self,
        quantity: QuantityType,
        _scale: f64,
        _point: &EvalPoint<'_>,
        _xd: &[f64],
        _dfdq: &[f64],
        _dfdx: &mut [f64],
    ) -> Result<()> {
        Err(ModelError::UnsupportedQuantity(quantity))
    }

    /// Set `sens` to `dfdqᵀ · ∂q/∂(x, xd, ut, ux)`
    fn eval_point_quantity_sens(
        &self,
        quantity: QuantityType,
        _point: &EvalPoint<'_>,
        _xd: &[f64],
        _dfdq: &[f64],
        _sens: &mut QuantitySens,
    ) -> Result<()> {
        Err(ModelError::UnsupportedQuantity(quantity))
    }

    /// Write one visualization record of at most `ld_data` values.
    ///
    /// Returns the number of values written; nothing is written for a
    /// foreign element type.
    fn output_data(
        &self,
        point: &EvalPoint<'_>,
        etype: ElementType,
        flags: OutputFlags,
        ld_data: usize,
        data: &mut [f64],
    ) -> Result<usize>;

    fn ut_len(&self) -> usize {
        self.dims().ut_len()
    }

    fn ux_len(&self) -> usize {
        self.dims().ux_len()
    }

    fn jacobian_size(&self) -> usize {
        self.dims().jacobian_size()
    }

    /// Validates the slice lengths of the point data
    fn check_point(&self, point: &EvalPoint<'_>) -> Result<()> {
        check_len("x", point.x.len(), NUM_COORDS)?;
        check_len("ut", point.ut.len(), self.ut_len())?;
        check_len("ux", point.ux.len(), self.ux_len())
    }

    /// Validates the coefficient buffers
    fn check_coefficients(&self, dut: &[f64], dux: &[f64]) -> Result<()> {
        check_len("dut", dut.len(), self.ut_len())?;
        check_len("dux", dux.len(), self.ux_len())
    }

    /// Validates the adjoint buffers
    fn check_adjoint(&self, psi: &[f64], psix: &[f64]) -> Result<()> {
        let dims = self.dims();
        check_len("psi", psi.len(), dims.vars_per_node())?;
        check_len("psix", psix.len(), dims.vars_per_node() * dims.spatial_dim())
    }
}

/// Fails unless `buffer` can hold `required` values.
pub(crate) fn check_output(what: &'static str, buffer: usize, required: usize) -> Result<()> {
    check_min_len(what, buffer, required)
}
