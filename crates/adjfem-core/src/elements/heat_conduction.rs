//! Transient in-plane heat conduction.

use super::{check_output, ElementModel, EvalPoint, JacobianPattern, ModelDims, QuantitySens};
use crate::constitutive::{Constitutive, SolidConstitutive};
use crate::error::{check_min_len, ModelError, Result};
use crate::materials::NUM_CONDUCTION_ENTRIES;
use crate::output::{ElementType, OutputFlags, RecordWriter};
use crate::quantity::QuantityType;

const DIMS: ModelDims = ModelDims::fixed(2, 1);

/// Scalar temperature model: `DUt[1] = ρ·c·Ṫ`, `DUx = [0, q_x, q_y]`
#[derive(Debug, Clone)]
pub struct HeatConduction2D<C: Constitutive = SolidConstitutive> {
    constitutive: C,
    pattern: Vec<(usize, usize)>,
}

impl<C: Constitutive> HeatConduction2D<C> {
    pub fn new(constitutive: C) -> Self {
        let capacity = DIMS.time_index(0, 1);
        let (gx, gy) = (DIMS.spatial_index(0, 0), DIMS.spatial_index(0, 1));
        Self {
            constitutive,
            pattern: vec![(capacity, capacity), (gx, gx), (gx, gy), (gy, gx), (gy, gy)],
        }
    }

    pub fn constitutive(&self) -> &C {
        &self.constitutive
    }

    fn gradient(point: &EvalPoint<'_>) -> [f64; 2] {
        [point.ux[DIMS.ux_index(0, 0)], point.ux[DIMS.ux_index(0, 1)]]
    }

    /// Flux carried by the weak form, `K·∇T` with the tangent conduction
    fn flux(&self, point: &EvalPoint<'_>, grad: &[f64; 2]) -> Result<[f64; 2]> {
        let k = self.conduction(point)?;
        Ok([k[0] * grad[0] + k[1] * grad[1], k[1] * grad[0] + k[2] * grad[1]])
    }

    fn conduction(&self, point: &EvalPoint<'_>) -> Result<[f64; NUM_CONDUCTION_ENTRIES]> {
        let mut k = [0.0; NUM_CONDUCTION_ENTRIES];
        self.constitutive
            .eval_tangent_heat_flux(point.elem_index, point.pt, point.x, &mut k)?;
        Ok(k)
    }

    /// Density and specific heat at the point
    fn capacity(&self, point: &EvalPoint<'_>) -> (f64, f64) {
        let (elem, pt, x) = (point.elem_index, point.pt, point.x);
        (
            self.constitutive.eval_density(elem, pt, x),
            self.constitutive.eval_specific_heat(elem, pt, x),
        )
    }
}

impl<C: Constitutive> ElementModel for HeatConduction2D<C> {
    fn dims(&self) -> ModelDims {
        DIMS
    }

    fn element_type(&self) -> ElementType {
        ElementType::Scalar2D
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

        let (rho, c) = self.capacity(point);
        dut.fill(0.0);
        dut[1] = rho * c * point.ut[1];

        let q = self.flux(point, &Self::gradient(point))?;
        dux[0] = 0.0;
        dux[1] = q[0];
        dux[2] = q[1];
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

        let (rho, c) = self.capacity(point);
        let k = self.conduction(point)?;
        jac[..5].copy_from_slice(&[rho * c, k[0], k[1], k[1], k[2]]);
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
        let (elem, pt, x) = (point.elem_index, point.pt, point.x);

        // d(ρc)/dx = c·dρ/dx + ρ·dc/dx
        let (rho, c) = self.capacity(point);
        let weight = scale * psi[0] * point.ut[1];
        self.constitutive
            .add_density_dv_sens(elem, weight * c, pt, x, fdv_sens)?;
        self.constitutive
            .add_specific_heat_dv_sens(elem, weight * rho, pt, x, fdv_sens)?;

        let grad = Self::gradient(point);
        self.constitutive
            .add_heat_flux_dv_sens(elem, scale, pt, x, &grad, psix, fdv_sens)
    }

    fn eval_point_quantity(
        &self,
        quantity: QuantityType,
        point: &EvalPoint<'_>,
        _xd: &[f64],
        out: &mut [f64],
    ) -> Result<usize> {
        self.check_point(point)?;
        match quantity {
            QuantityType::DENSITY => {
                check_output("quantity", out.len(), 1)?;
                out[0] = self.capacity(point).0;
                Ok(1)
            }
            QuantityType::TEMPERATURE => {
                check_output("quantity", out.len(), 1)?;
                out[0] = point.ut[0];
                Ok(1)
            }
            QuantityType::HEAT_FLUX => {
                check_output("quantity", out.len(), 2)?;
                let q = self.flux(point, &Self::gradient(point))?;
                out[..2].copy_from_slice(&q);
                Ok(2)
            }
            _ => Err(ModelError::UnsupportedQuantity(quantity)),
        }
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
            QuantityType::DENSITY => {
                check_min_len("dfdq", dfdq.len(), 1)?;
                self.constitutive
                    .add_density_dv_sens(elem, scale * dfdq[0], pt, x, dfdx)
            }
            QuantityType::TEMPERATURE => Ok(()),
            QuantityType::HEAT_FLUX => {
                check_min_len("dfdq", dfdq.len(), 2)?;
                let grad = Self::gradient(point);
                self.constitutive
                    .add_heat_flux_dv_sens(elem, scale, pt, x, &grad, &dfdq[..2], dfdx)
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
        match quantity {
            QuantityType::DENSITY => {
                check_min_len("dfdq", dfdq.len(), 1)?;
                sens.clear();
            }
            QuantityType::TEMPERATURE => {
                check_min_len("dfdq", dfdq.len(), 1)?;
                sens.clear();
                sens.dfdut[0] = dfdq[0];
            }
            QuantityType::HEAT_FLUX => {
                check_min_len("dfdq", dfdq.len(), 2)?;
                let k = self.conduction(point)?;
                sens.clear();
                sens.dfdux[DIMS.ux_index(0, 0)] = dfdq[0] * k[0] + dfdq[1] * k[1];
                sens.dfdux[DIMS.ux_index(0, 1)] = dfdq[0] * k[1] + dfdq[1] * k[2];
            }
            _ => return Err(ModelError::UnsupportedQuantity(quantity)),
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
        if etype != ElementType::Scalar2D {
            return Ok(0);
        }
        self.check_point(point)?;

        let mut record = RecordWriter::new(etype, flags, ld_data, data)?;
        let grad = Self::gradient(point);
        if flags.contains(OutputFlags::NODES) {
            record.extend(point.x);
        }
        if flags.contains(OutputFlags::DISPLACEMENTS) {
            record.extend(&point.ut[..1]);
        }
        if flags.contains(OutputFlags::STRAINS) {
            record.extend(&grad);
        }
        if flags.contains(OutputFlags::STRESSES) {
            let mut q = [0.0; 2];
            self.constitutive
                .eval_heat_flux(point.elem_index, point.pt, point.x, &grad, &mut q)?;
            record.extend(&q);
        }
        if flags.contains(OutputFlags::EXTRAS) {
            record.extend(&[self.capacity(point).0]);
        }
        Ok(record.len())
    }
}
