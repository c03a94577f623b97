//! 3-D linear elasticity with inertia and an optional uniform thermal load.

use super::{
    check_output, ElementModel, EvalPoint, JacobianPattern, ModelDims, QuantitySens,
};
use crate::constitutive::{Constitutive, SolidConstitutive};
use crate::error::{check_min_len, ModelError, Result};
use crate::materials::{SymmetricStiffness, NUM_STIFFNESS_ENTRIES};
use crate::output::{ElementType, OutputFlags, RecordWriter};
use crate::quantity::QuantityType;

const DIMS: ModelDims = ModelDims::fixed(3, 3);

/// Voigt component receiving displacement gradient `∂u_k/∂x_a`
const VOIGT: [[usize; 3]; 3] = [[0, 5, 4], [5, 1, 3], [4, 3, 2]];

/// Solid element physics for the state `(u, v, w)`.
///
/// Weak-form coefficients per displacement component `k`:
/// `DUt[3k+2] = ρ·ü_k` and `DUx[4k+1+a] = σ_{V(k,a)}`, where `σ = C·(e − θ·α)`
/// applies the tangent operator of the constitutive to the mechanical strain.
#[derive(Debug, Clone)]
pub struct LinearElasticity3D<C: Constitutive = SolidConstitutive> {
    constitutive: C,
    thermal_load: f64,
    pattern: Vec<(usize, usize)>,
}

impl<C: Constitutive> LinearElasticity3D<C> {
    pub fn new(constitutive: C) -> Self {
        Self::with_thermal_load(constitutive, 0.0)
    }

    /// Model with a uniform temperature change `theta`
    pub fn with_thermal_load(constitutive: C, theta: f64) -> Self {
        Self {
            constitutive,
            thermal_load: theta,
            pattern: jacobian_pattern(),
        }
    }

    pub fn constitutive(&self) -> &C {
        &self.constitutive
    }

    pub fn thermal_load(&self) -> f64 {
        self.thermal_load
    }

    /// Total strain from the displacement gradients in `ux`
    pub fn strain(ux: &[f64]) -> [f64; 6] {
        let mut e = [0.0; 6];
        for (k, row) in VOIGT.iter().enumerate() {
            for (a, &m) in row.iter().enumerate() {
                e[m] += ux[DIMS.ux_index(k, a)];
            }
        }
        e
    }

    /// Strain minus the thermal strain of the applied load
    fn mechanical_strain(&self, point: &EvalPoint<'_>) -> Result<[f64; 6]> {
        let mut e = Self::strain(point.ux);
        if self.thermal_load != 0.0 {
            let mut et = [0.0; 6];
            self.constitutive.eval_thermal_strain(
                point.elem_index,
                point.pt,
                point.x,
                self.thermal_load,
                &mut et,
            )?;
            for (e, et) in e.iter_mut().zip(et) {
                *e -= et;
            }
        }
        Ok(e)
    }

    fn tangent(&self, point: &EvalPoint<'_>) -> Result<SymmetricStiffness> {
        let mut c = [0.0; NUM_STIFFNESS_ENTRIES];
        self.constitutive
            .eval_tangent_stiffness(point.elem_index, point.pt, point.x, &mut c)?;
        Ok(SymmetricStiffness(c))
    }

    /// Stress carried by the weak form, linear in the tangent
    fn resultant_stress(&self, point: &EvalPoint<'_>, strain: &[f64; 6]) -> Result<[f64; 6]> {
        Ok(self.tangent(point)?.mult(strain))
    }

    fn density(&self, point: &EvalPoint<'_>) -> f64 {
        self.constitutive
            .eval_density(point.elem_index, point.pt, point.x)
    }
}

/// 3 mass entries followed by the 81 stiffness entries, row-major by
/// (component, direction)
fn jacobian_pattern() -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(3 + 81);
    for k in 0..3 {
        let row = DIMS.time_index(k, 2);
        pairs.push((row, row));
    }
    for k in 0..3 {
        for a in 0..3 {
            for l in 0..3 {
                for b in 0..3 {
                    pairs.push((DIMS.spatial_index(k, a), DIMS.spatial_index(l, b)));
                }
            }
        }
    }
    pairs
}

impl<C: Constitutive> ElementModel for LinearElasticity3D<C> {
    fn dims(&self) -> ModelDims {
        DIMS
    }

    fn element_type(&self) -> ElementType {
        ElementType::Solid
    }

    fn design_var_nums(&self, elem_index: usize, dv_nums: Option<&mut [usize]>) -> Result<usize> {
        self.constitutive.design_var_nums(elem_index, dv_nums)
    }

    fn set_design_vars(&mut self, elem_index: usize, dvs: &[f64]) -> Result<()> {
        self.constitutive.set_design_vars(elem_index, dvs)
    }

    fn design_vars(&self, elem_index: usize, dvs: &mut [f64]) -> Result<()> {
        self.constitutive.design_vars(elem_index, dvs)
    }

    fn design_var_range(&self, elem_index: usize, lb: &mut [f64], ub: &mut [f64]) -> Result<()> {
        self.constitutive.design_var_range(elem_index, lb, ub)
    }

    fn eval_weak_integrand(&self, point: &EvalPoint<'_>, dut: &mut [f64], dux: &mut [f64]) -> Result<()> {
        self.check_point(point)?;
        self.check_coefficients(dut, dux)?;

        let rho = self.density(point);
        dut.fill(0.0);
        for k in 0..3 {
            dut[3 * k + 2] = rho * point.ut[3 * k + 2];
        }

        let e = self.mechanical_strain(point)?;
        let s = self.resultant_stress(point, &e)?;
        dux.fill(0.0);
        for (k, row) in VOIGT.iter().enumerate() {
            for (a, &m) in row.iter().enumerate() {
                dux[DIMS.ux_index(k, a)] = s[m];
            }
        }
        Ok(())
    }

    fn eval_weak_jacobian(
        &self,
        point: &EvalPoint<'_>,
        dut: &mut [f64],
        dux: &mut [f64],
        jac: &mut [f64],
    ) -> Result<JacobianPattern<'_>> {
        self.eval_weak_integrand(point, dut, dux)?;
        check_output("jac", jac.len(), self.pattern.len())?;

        let rho = self.density(point);
        let c = self.tangent(point)?;

        jac[..3].fill(rho);
        let mut n = 3;
        for row_k in VOIGT.iter() {
            for &m in row_k.iter() {
                for row_l in VOIGT.iter() {
                    for &p in row_l.iter() {
                        jac[n] = c.get(m, p);
                        n += 1;
                    }
                }
            }
        }
        Ok(JacobianPattern::Sparse(&self.pattern))
    }

    fn add_weak_adj_product(
        &self,
        point: &EvalPoint<'_>,
        psi: &[f64],
        psix: &[f64],
        scale: f64,
        fdv_sens: &mut [f64],
    ) -> Result<()> {
        self.check_point(point)?;
        self.check_adjoint(psi, psix)?;

        let inertia: f64 = (0..3).map(|k| psi[k] * point.ut[3 * k + 2]).sum();
        self.constitutive.add_density_dv_sens(
            point.elem_index,
            scale * inertia,
            point.pt,
            point.x,
            fdv_sens,
        )?;

        // Adjoint gradients gathered into a strain-like vector
        let mut phi = [0.0; 6];
        for (k, row) in VOIGT.iter().enumerate() {
            for (a, &m) in row.iter().enumerate() {
                phi[m] += psix[3 * k + a];
            }
        }
        let e = self.mechanical_strain(point)?;
        self.constitutive.add_stress_dv_sens(
            point.elem_index,
            scale,
            point.pt,
            point.x,
            &e,
            &phi,
            fdv_sens,
        )
    }

    fn eval_point_quantity(
        &self,
        quantity: QuantityType,
        point: &EvalPoint<'_>,
        _xd: &[f64],
        out: &mut [f64],
    ) -> Result<usize> {
        self.check_point(point)?;
        let value = match quantity {
            QuantityType::FAILURE_INDEX => {
                let e = self.mechanical_strain(point)?;
                self.constitutive
                    .eval_failure(point.elem_index, point.pt, point.x, &e)?
            }
            QuantityType::DENSITY => self.density(point),
            QuantityType::STRAIN_ENERGY_DENSITY => {
                let e = self.mechanical_strain(point)?;
                let s = self.resultant_stress(point, &e)?;
                0.5 * s.iter().zip(e).map(|(s, e)| s * e).sum::<f64>()
            }
            _ => return Err(ModelError::UnsupportedQuantity(quantity)),
        };
        check_output("quantity", out.len(), 1)?;
        out[0] = value;
        Ok(1)
    }

    fn add_point_quantity_dv_sens(
        &self,
        quantity: QuantityType,
        scale: f64,
        point: &EvalPoint<'_>,
        _xd: &[f64],
        dfdq: &[f64],
        dfdx: &mut [f64],
    ) -> Result<()> {
        self.check_point(point)?;
        let (elem, pt, x) = (point.elem_index, point.pt, point.x);
        match quantity {
            QuantityType::FAILURE_INDEX => {
                check_min_len("dfdq", dfdq.len(), 1)?;
                let e = self.mechanical_strain(point)?;
                self.constitutive
                    .add_failure_dv_sens(elem, scale * dfdq[0], pt, x, &e, dfdx)
            }
            QuantityType::DENSITY => {
                check_min_len("dfdq", dfdq.len(), 1)?;
                self.constitutive
                    .add_density_dv_sens(elem, scale * dfdq[0], pt, x, dfdx)
            }
            QuantityType::STRAIN_ENERGY_DENSITY => {
                check_min_len("dfdq", dfdq.len(), 1)?;
                // ½ eᵀσ(e) is quadratic, so its design derivative is ½ eᵀ ∂σ/∂x
                let e = self.mechanical_strain(point)?;
                self.constitutive
                    .add_stress_dv_sens(elem, 0.5 * scale * dfdq[0], pt, x, &e, &e, dfdx)
            }
            _ => Err(ModelError::UnsupportedQuantity(quantity)),
        }
    }

    fn eval_point_quantity_sens(
        &self,
        quantity: QuantityType,
        point: &EvalPoint<'_>,
        _xd: &[f64],
        dfdq: &[f64],
        sens: &mut QuantitySens,
    ) -> Result<()> {
        self.check_point(point)?;
        sens.check(DIMS)?;
        let de = match quantity {
            QuantityType::FAILURE_INDEX => {
                let e = self.mechanical_strain(point)?;
                let mut dfde = [0.0; 6];
                self.constitutive.eval_failure_strain_sens(
                    point.elem_index,
                    point.pt,
                    point.x,
                    &e,
                    &mut dfde,
                )?;
                Some(dfde)
            }
            QuantityType::DENSITY => None,
            QuantityType::STRAIN_ENERGY_DENSITY => {
                let e = self.mechanical_strain(point)?;
                Some(self.resultant_stress(point, &e)?)
            }
            _ => return Err(ModelError::UnsupportedQuantity(quantity)),
        };
        check_min_len("dfdq", dfdq.len(), 1)?;

        sens.clear();
        if let Some(de) = de {
            for (k, row) in VOIGT.iter().enumerate() {
                for (a, &m) in row.iter().enumerate() {
                    sens.dfdux[DIMS.ux_index(k, a)] = dfdq[0] * de[m];
                }
            }
        }
        Ok(())
    }

    fn output_data(
        &self,
        point: &EvalPoint<'_>,
        etype: ElementType,
        flags: OutputFlags,
        ld_data: usize,
        data: &mut [f64],
    ) -> Result<usize> {
        if etype != ElementType::Solid {
            return Ok(0);
        }
        self.check_point(point)?;

        let mut record = RecordWriter::new(etype, flags, ld_data, data)?;
        if flags.contains(OutputFlags::NODES) {
            record.extend(point.x);
        }
        if flags.contains(OutputFlags::DISPLACEMENTS) {
            record.extend(&[point.ut[0], point.ut[3], point.ut[6]]);
        }
        let e = Self::strain(point.ux);
        if flags.contains(OutputFlags::STRAINS) {
            record.extend(&e);
        }
        let needs_stress =
            flags.contains(OutputFlags::STRESSES) || flags.contains(OutputFlags::EXTRAS);
        if needs_stress {
            let em = self.mechanical_strain(point)?;
            if flags.contains(OutputFlags::STRESSES) {
                let mut s = [0.0; 6];
                self.constitutive
                    .eval_stress(point.elem_index, point.pt, point.x, &em, &mut s)?;
                record.extend(&s);
            }
            if flags.contains(OutputFlags::EXTRAS) {
                let failure = self
                    .constitutive
                    .eval_failure(point.elem_index, point.pt, point.x, &em)?;
                record.extend(&[failure, self.density(point)]);
            }
        }
        Ok(record.len())
    }
}
