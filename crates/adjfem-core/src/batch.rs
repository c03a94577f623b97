//! Parallel evaluation over many quadrature points.
//!
//! Evaluation methods take `&self`, so a single model is shared across rayon
//! workers. Sensitivity contributions go into per-worker buffers that are
//! summed once all points are processed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::elements::{ElementModel, EvalPoint};
use crate::error::Result;
use crate::quantity::QuantityType;

/// Owned point data with its integration weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub elem_index: usize,
    pub time: f64,
    pub quad_index: usize,
    pub pt: Vec<f64>,
    pub x: Vec<f64>,
    pub ut: Vec<f64>,
    pub ux: Vec<f64>,
    /// Quadrature weight times the Jacobian determinant
    pub weight: f64,
}

impl PointSample {
    pub fn as_point(&self) -> EvalPoint<'_> {
        EvalPoint {
            elem_index: self.elem_index,
            time: self.time,
            quad_index: self.quad_index,
            pt: &self.pt,
            x: &self.x,
            ut: &self.ut,
            ux: &self.ux,
        }
    }
}

/// Point data paired with the adjoint values at the point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjointSample {
    pub point: PointSample,
    pub psi: Vec<f64>,
    pub psix: Vec<f64>,
}

/// Weak-form coefficients of one point
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeakCoefficients {
    pub dut: Vec<f64>,
    pub dux: Vec<f64>,
}

/// Evaluates the weak-form coefficients at every sample in parallel
pub fn par_eval_weak_integrand<M: ElementModel + ?Sized>(
    model: &M,
    samples: &[PointSample],
) -> Result<Vec<WeakCoefficients>> {
    samples
        .par_iter()
        .map(|sample| -> Result<WeakCoefficients> {
            let mut coeffs = WeakCoefficients {
                dut: vec![0.0; model.ut_len()],
                dux: vec![0.0; model.ux_len()],
            };
            model.eval_weak_integrand(&sample.as_point(), &mut coeffs.dut, &mut coeffs.dux)?;
            Ok(coeffs)
        })
        .collect()
}

/// Length of the element-local design array shared by the samples
fn design_len<M: ElementModel + ?Sized>(model: &M, samples: &[AdjointSample]) -> Result<usize> {
    match samples.first() {
        Some(first) => model.design_var_nums(first.point.elem_index, None),
        None => Ok(0),
    }
}

/// `Σ scale·wᵢ·(∂Rᵢ/∂x)ᵀ` over the samples, one point after the other
pub fn weak_adj_product<M: ElementModel + ?Sized>(
    model: &M,
    samples: &[AdjointSample],
    scale: f64,
) -> Result<Vec<f64>> {
    let mut sens = vec![0.0; design_len(model, samples)?];
    for sample in samples {
        model.add_weak_adj_product(
            &sample.point.as_point(),
            &sample.psi,
            &sample.psix,
            scale * sample.point.weight,
            &mut sens,
        )?;
    }
    Ok(sens)
}

/// Parallel form of [`weak_adj_product`]
pub fn par_weak_adj_product<M: ElementModel + ?Sized>(
    model: &M,
    samples: &[AdjointSample],
    scale: f64,
) -> Result<Vec<f64>> {
    let n = design_len(model, samples)?;
    samples
        .par_iter()
        .try_fold(
            || vec![0.0; n],
            |mut sens, sample| -> Result<Vec<f64>> {
                model.add_weak_adj_product(
                    &sample.point.as_point(),
                    &sample.psi,
                    &sample.psix,
                    scale * sample.point.weight,
                    &mut sens,
                )?;
                Ok(sens)
            },
        )
        .try_reduce(
            || vec![0.0; n],
            |mut a, b| {
                for (a, b) in a.iter_mut().zip(b) {
                    *a += b;
                }
                Ok(a)
            },
        )
}

/// Evaluates a point quantity at every sample in parallel
pub fn par_point_quantity<M: ElementModel + ?Sized>(
    model: &M,
    quantity: QuantityType,
    samples: &[PointSample],
) -> Result<Vec<Vec<f64>>> {
    samples
        .par_iter()
        .map(|sample| -> Result<Vec<f64>> {
            let mut out = vec![0.0; QuantityType::MAX_LEN];
            let n = model.eval_point_quantity(quantity, &sample.as_point(), &[], &mut out)?;
            out.truncate(n);
            Ok(out)
        })
        .collect()
}

/// Weighted integral `Σ wᵢ·qᵢ` of a quantity, component by component
pub fn par_integrate_quantity<M: ElementModel + ?Sized>(
    model: &M,
    quantity: QuantityType,
    samples: &[PointSample],
) -> Result<Vec<f64>> {
    let values = par_point_quantity(model, quantity, samples)?;
    let len = values.first().map_or(0, Vec::len);
    let mut total = vec![0.0; len];
    for (sample, q) in samples.iter().zip(&values) {
        for (t, v) in total.iter_mut().zip(q) {
            *t += sample.weight * v;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constitutive::SolidConstitutive;
    use crate::elements::{HeatConduction2D, JacobianPattern};
    use crate::error::ModelError;
    use crate::materials::MaterialProperties;
    use crate::output::{ElementType, OutputFlags};
    use std::sync::Arc;

    fn model() -> HeatConduction2D {
        let mat = MaterialProperties::isotropic("steel", 7850.0, 210e9, 0.3, 250e6)
            .unwrap()
            .with_specific_heat(460.0)
            .with_conductivity(45.0);
        HeatConduction2D::new(SolidConstitutive::new(Some(Arc::new(mat)), 0.8, Some(0), 0.1, 2.0))
    }

    fn sample(i: usize) -> AdjointSample {
        let s = i as f64;
        AdjointSample {
            point: PointSample {
                elem_index: 0,
                time: 0.0,
                quad_index: i % 4,
                pt: vec![0.0, 0.0],
                x: vec![s, 0.5 * s, 0.0],
                ut: vec![300.0 + s, 0.1 * s, 0.0],
                ux: vec![300.0 + s, (0.3 * s).sin(), (0.7 * s).cos()],
                weight: 0.25,
            },
            psi: vec![(0.2 * s).cos()],
            psix: vec![1.0 - 0.01 * s, 0.05 * s],
        }
    }

    #[test]
    fn parallel_reduction_equals_sequential_sum() {
        let m = model();
        let samples: Vec<AdjointSample> = (0..257).map(sample).collect();
        let seq = weak_adj_product(&m, &samples, 2.0).unwrap();
        let par = par_weak_adj_product(&m, &samples, 2.0).unwrap();
        assert_eq!(seq.len(), 1);
        assert!((seq[0] - par[0]).abs() <= 1e-10 * seq[0].abs().max(1.0));
    }

    #[test]
    fn empty_batch_has_no_contribution() {
        let m = model();
        assert!(par_weak_adj_product(&m, &[], 1.0).unwrap().is_empty());
        assert!(par_eval_weak_integrand(&m, &[]).unwrap().is_empty());
    }

    #[test]
    fn parallel_integrand_matches_pointwise() {
        let m = model();
        let points: Vec<PointSample> = (0..16).map(|i| sample(i).point).collect();
        let coeffs = par_eval_weak_integrand(&m, &points).unwrap();
        for (p, c) in points.iter().zip(&coeffs) {
            let (mut dut, mut dux) = (vec![0.0; 3], vec![0.0; 3]);
            m.eval_weak_integrand(&p.as_point(), &mut dut, &mut dux).unwrap();
            assert_eq!(c.dut, dut);
            assert_eq!(c.dux, dux);
        }
    }

    #[test]
    fn integrated_quantity_is_weighted_sum() {
        let m = model();
        let points: Vec<PointSample> = (0..8).map(|i| sample(i).point).collect();
        let total = par_integrate_quantity(&m, QuantityType::DENSITY, &points).unwrap();
        assert_eq!(total.len(), 1);
        assert!((total[0] - 8.0 * 0.25 * 0.8 * 7850.0).abs() < 1e-8);

        let flux = par_point_quantity(&m, QuantityType::HEAT_FLUX, &points).unwrap();
        assert!(flux.iter().all(|q| q.len() == 2));
    }

    /// Heat conduction with one extra quantity of the widest allowed size
    struct Spectrum(HeatConduction2D);

    const SPECTRUM: QuantityType = QuantityType(QuantityType::FIRST_USER_TAG);

    impl ElementModel for Spectrum {
        fn dims(&self) -> crate::elements::ModelDims {
            self.0.dims()
        }

        fn element_type(&self) -> ElementType {
            self.0.element_type()
        }

        fn eval_weak_integrand(&self, point: &EvalPoint<'_>, dut: &mut [f64], dux: &mut [f64]) -> Result<()> {
            self.0.eval_weak_integrand(point, dut, dux)
        }

        fn eval_weak_jacobian(
            &self,
            point: &EvalPoint<'_>,
            dut: &mut [f64],
            dux: &mut [f64],
            jac: &mut [f64],
        ) -> Result<JacobianPattern<'_>> {
            self.0.eval_weak_jacobian(point, dut, dux, jac)
        }

        fn eval_point_quantity(
            &self,
            quantity: QuantityType,
            point: &EvalPoint<'_>,
            xd: &[f64],
            out: &mut [f64],
        ) -> Result<usize> {
            if quantity != SPECTRUM {
                return self.0.eval_point_quantity(quantity, point, xd, out);
            }
            let n = QuantityType::MAX_LEN;
            crate::error::check_min_len("quantity", out.len(), n)?;
            for (k, v) in out[..n].iter_mut().enumerate() {
                *v = point.ut[0] * k as f64;
            }
            Ok(n)
        }

        fn output_data(
            &self,
            point: &EvalPoint<'_>,
            etype: ElementType,
            flags: OutputFlags,
            ld_data: usize,
            data: &mut [f64],
        ) -> Result<usize> {
            self.0.output_data(point, etype, flags, ld_data, data)
        }
    }

    #[test]
    fn widest_quantity_fits_batch_buffer() {
        let m = Spectrum(model());
        let points: Vec<PointSample> = (0..4).map(|i| sample(i).point).collect();
        let values = par_point_quantity(&m, SPECTRUM, &points).unwrap();
        for (p, q) in points.iter().zip(&values) {
            assert_eq!(q.len(), QuantityType::MAX_LEN);
            assert_eq!(q[QuantityType::MAX_LEN - 1], p.ut[0] * 15.0);
        }
        let temps = par_point_quantity(&m, QuantityType::TEMPERATURE, &points).unwrap();
        assert!(temps.iter().all(|q| q.len() == 1));
    }

    #[test]
    fn first_error_is_propagated() {
        let m = model();
        let mut points: Vec<PointSample> = (0..8).map(|i| sample(i).point).collect();
        points[5].ux.pop();
        assert!(matches!(
            par_eval_weak_integrand(&m, &points),
            Err(ModelError::LengthMismatch { what: "ux", .. })
        ));
        assert_eq!(
            par_point_quantity(&m, QuantityType::FAILURE_INDEX, &points[..2]),
            Err(ModelError::UnsupportedQuantity(QuantityType::FAILURE_INDEX))
        );
    }
}
