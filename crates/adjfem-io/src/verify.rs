//! Runs the derivative checks on every element of a case.

use adjfem_core::{
    check_point_quantity_dv_sens, check_point_quantity_sens, check_weak_adj_product,
    check_weak_jacobian, AdjointSample, ElementModel, ModelDims, ModelError, PointSample,
    QuantityRegistry, QuantityType, VerificationConfig,
};
use log::{debug, info};

use crate::case::{BuiltElement, CaseFile};
use crate::error::Result;
use crate::report::{ElementReport, VerificationReport};

/// Magnitude of the sampled state; keeps strains well above the step size
const STATE_AMPLITUDE: f64 = 1e-2;

/// Deterministic, non-degenerate point data for a model of shape `dims`.
///
/// Every entry is distinct so that no coupling term is hidden by symmetry.
pub fn sample_point(dims: ModelDims, elem_index: usize) -> PointSample {
    let shift = elem_index as f64;
    let wave = |i: usize, freq: f64, phase: f64| (freq * i as f64 + phase + 0.37 * shift).sin();
    PointSample {
        elem_index,
        time: 0.0,
        quad_index: 0,
        pt: (0..dims.spatial_dim()).map(|i| 0.5 * wave(i, 2.1, 0.2)).collect(),
        x: vec![0.1, 0.2, 0.3],
        ut: (0..dims.ut_len())
            .map(|i| STATE_AMPLITUDE * (1.0 + 0.5 * wave(i, 1.7, 0.3)))
            .collect(),
        ux: (0..dims.ux_len())
            .map(|i| STATE_AMPLITUDE * wave(i, 2.3, 0.9))
            .collect(),
        weight: 1.0,
    }
}

/// Adjoint values paired with [`sample_point`]
pub fn sample_adjoint(dims: ModelDims, elem_index: usize) -> AdjointSample {
    let vpn = dims.vars_per_node();
    AdjointSample {
        point: sample_point(dims, elem_index),
        psi: (0..vpn).map(|i| (1.1 * i as f64 + 0.4).cos()).collect(),
        psix: (0..vpn * dims.spatial_dim())
            .map(|i| (0.8 * i as f64 + 1.3).sin())
            .collect(),
    }
}

/// Whether `model` evaluates `quantity` at the sample point
fn supports(model: &dyn ElementModel, quantity: QuantityType, sample: &PointSample) -> Result<bool> {
    let mut out = [0.0; 16];
    match model.eval_point_quantity(quantity, &sample.as_point(), &[], &mut out) {
        Ok(_) => Ok(true),
        Err(ModelError::UnsupportedQuantity(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// All checks for one element
pub fn verify_element(
    element: &mut BuiltElement,
    elem_index: usize,
    quantities: &[QuantityType],
    registry: &QuantityRegistry,
    config: &VerificationConfig,
) -> Result<ElementReport> {
    let model = element.model.as_mut();
    let adjoint = sample_adjoint(model.dims(), elem_index);
    let point = adjoint.point.as_point();

    let mut checks = vec![check_weak_jacobian(&*model, &point, config)?];
    checks.push(check_weak_adj_product(
        &mut *model,
        &point,
        &adjoint.psi,
        &adjoint.psix,
        config,
    )?);

    for &quantity in quantities {
        if !supports(&*model, quantity, &adjoint.point)? {
            debug!(
                "{}: skipping unsupported quantity {}",
                element.name,
                registry.name(quantity).unwrap_or("?")
            );
            continue;
        }
        let label = registry.name(quantity).map(str::to_string).unwrap_or_else(|| quantity.to_string());
        let mut sens = check_point_quantity_sens(&*model, quantity, &point, &[], config)?;
        sens.name = format!("{label} state sensitivity");
        let mut dv = check_point_quantity_dv_sens(&mut *model, quantity, &point, &[], config)?;
        dv.name = format!("{label} design sensitivity");
        checks.push(sens);
        checks.push(dv);
    }

    Ok(ElementReport {
        name: element.name.clone(),
        kind: element.kind.to_string(),
        checks,
    })
}

/// Builds every element of `case` and checks its derivatives
pub fn verify_case(case: &CaseFile) -> Result<VerificationReport> {
    case.validate()?;
    let registry = QuantityRegistry::with_builtin();
    let quantities = case.resolve_quantities(&registry)?;
    let library = case.build_library()?;
    let mut elements = case.build_models(&library)?;

    let mut reports = Vec::with_capacity(elements.len());
    for (i, element) in elements.iter_mut().enumerate() {
        info!("verifying {} ({})", element.name, element.kind);
        reports.push(verify_element(
            element,
            i,
            &quantities,
            &registry,
            &case.verification,
        )?);
    }

    let report = VerificationReport {
        case_name: case.name.clone(),
        generated_at: None,
        elements: reports,
    };
    info!(
        "case '{}': {} of {} checks failed",
        report.case_name,
        report.num_failed(),
        report.num_checks()
    );
    Ok(report)
}
