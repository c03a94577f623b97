//! Constitutive contract: strain to stress, gradient to flux, and the design
//! sensitivities of both.

pub mod solid;

pub use solid::SolidConstitutive;

use crate::error::Result;

/// Material behavior of one element (or group of elements).
///
/// Every method takes the element index, the parametric point `pt` and the
/// physical point `x` so that spatially varying implementations can be
/// plugged in. Design-variable arrays are element-local and ordered as
/// returned by [`Constitutive::design_var_nums`].
///
/// Sensitivity methods follow one pattern: evaluate the forward quantity,
/// take its gradient in the natural space (stress, flux), then pull that
/// gradient back through the linear constitutive map.
pub trait Constitutive: Send + Sync {
    /// Number of stress components
    fn num_stresses(&self) -> usize;

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

    fn eval_density(&self, elem_index: usize, pt: &[f64], x: &[f64]) -> f64;

    /// `dfdx += scale · ∂ρ/∂x`
    fn add_density_dv_sens(
        &self,
        _elem_index: usize,
        _scale: f64,
        _pt: &[f64],
        _x: &[f64],
        _dfdx: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }

    fn eval_specific_heat(&self, elem_index: usize, pt: &[f64], x: &[f64]) -> f64;

    /// `dfdx += scale · ∂c/∂x`
    fn add_specific_heat_dv_sens(
        &self,
        _elem_index: usize,
        _scale: f64,
        _pt: &[f64],
        _x: &[f64],
        _dfdx: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }

    /// Material stress `C·strain`
    fn eval_stress(
        &self,
        elem_index: usize,
        pt: &[f64],
        x: &[f64],
        strain: &[f64],
        stress: &mut [f64],
    ) -> Result<()>;

    /// Packed symmetric tangent exposed to the solver; element models build
    /// their stress coefficients from it
    fn eval_tangent_stiffness(
        &self,
        elem_index: usize,
        pt: &[f64],
        x: &[f64],
        c: &mut [f64],
    ) -> Result<()>;

    /// `dfdx += scale · psiᵀ · ∂(C·strain)/∂x`, with `C` the operator from
    /// [`Constitutive::eval_tangent_stiffness`]
    #[allow(clippy::too_many_arguments)]
    fn add_stress_dv_sens(
        &self,
        _elem_index: usize,
        _scale: f64,
        _pt: &[f64],
        _x: &[f64],
        _strain: &[f64],
        _psi: &[f64],
        _dfdx: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }

    /// Thermal strain for the temperature (or load) parameter `theta`
    fn eval_thermal_strain(
        &self,
        elem_index: usize,
        pt: &[f64],
        x: &[f64],
        theta: f64,
        strain: &mut [f64],
    ) -> Result<()>;

    /// Material flux `K·grad`
    fn eval_heat_flux(
        &self,
        elem_index: usize,
        pt: &[f64],
        x: &[f64],
        grad: &[f64],
        flux: &mut [f64],
    ) -> Result<()>;

    /// Packed symmetric conduction tangent exposed to the solver
    fn eval_tangent_heat_flux(
        &self,
        elem_index: usize,
        pt: &[f64],
        x: &[f64],
        c: &mut [f64],
    ) -> Result<()>;

    /// `dfdx += scale · psiᵀ · ∂(K·grad)/∂x`, with `K` the operator from
    /// [`Constitutive::eval_tangent_heat_flux`]
    #[allow(clippy::too_many_arguments)]
    fn add_heat_flux_dv_sens(
        &self,
        _elem_index: usize,
        _scale: f64,
        _pt: &[f64],
        _x: &[f64],
        _grad: &[f64],
        _psi: &[f64],
        _dfdx: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }

    /// Failure index for a strain state.
    ///
    /// Zero means no material is bound, not that the point is safe.
    fn eval_failure(&self, elem_index: usize, pt: &[f64], x: &[f64], strain: &[f64]) -> Result<f64>;

    /// Failure index and its derivative with respect to strain
    fn eval_failure_strain_sens(
        &self,
        elem_index: usize,
        pt: &[f64],
        x: &[f64],
        strain: &[f64],
        dfde: &mut [f64],
    ) -> Result<f64>;

    /// `dfdx += scale · ∂failure/∂x`
    fn add_failure_dv_sens(
        &self,
        _elem_index: usize,
        _scale: f64,
        _pt: &[f64],
        _x: &[f64],
        _strain: &[f64],
        _dfdx: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }
}
