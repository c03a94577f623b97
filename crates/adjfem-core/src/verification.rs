//! Central-difference checks of the analytic derivatives.
//!
//! Each check evaluates an analytic derivative, recomputes it by central
//! differences of the forward evaluation and reports the largest error in a
//! [`CheckResult`]. Errors are measured against the magnitude of the
//! finite-difference vector as a whole, so entries that vanish analytically
//! do not blow up the relative error.
//!
//! Checks that perturb design variables take `&mut` access and restore the
//! original values before returning, including on error.

use log::info;
use serde::{Deserialize, Serialize};

use crate::constitutive::Constitutive;
use crate::elements::{ElementModel, EvalPoint, JacobianView, QuantitySens, NUM_COORDS};
use crate::error::{check_len, Result};
use crate::materials::{SymmetricStiffness, NUM_CONDUCTION_ENTRIES, NUM_STIFFNESS_ENTRIES};
use crate::quantity::QuantityType;

/// Step size and tolerances of the finite-difference checks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Central-difference step
    pub step_size: f64,
    pub rtol: f64,
    pub atol: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            step_size: 1e-6,
            rtol: 1e-5,
            atol: 1e-8,
        }
    }
}

/// Outcome of one derivative check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    /// Number of compared entries
    pub entries: usize,
    pub max_abs_err: f64,
    /// `max_abs_err` relative to the largest finite-difference entry
    pub max_rel_err: f64,
    /// Entry with the largest error
    pub worst_index: Option<usize>,
    pub passed: bool,
}

impl CheckResult {
    /// Compares `analytic` with `fd` entry by entry
    pub fn compare(name: impl Into<String>, analytic: &[f64], fd: &[f64], config: &VerificationConfig) -> Self {
        let scale = fd.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let mut max_abs_err = 0.0;
        let mut worst_index = None;
        for (i, (a, f)) in analytic.iter().zip(fd).enumerate() {
            let err = (a - f).abs();
            if err > max_abs_err || (err.is_nan() && worst_index.is_none()) {
                max_abs_err = err;
                worst_index = Some(i);
            }
        }
        let max_rel_err = if scale > 0.0 { max_abs_err / scale } else { max_abs_err };
        let passed = analytic.len() == fd.len() && max_abs_err <= config.atol + config.rtol * scale;

        let result = Self {
            name: name.into(),
            entries: analytic.len(),
            max_abs_err,
            max_rel_err,
            worst_index,
            passed,
        };
        info!(
            "{}: {} entries, max abs err {:.3e}, max rel err {:.3e} [{}]",
            result.name,
            result.entries,
            result.max_abs_err,
            result.max_rel_err,
            if result.passed { "PASS" } else { "FAIL" }
        );
        result
    }

    /// Result of a check with nothing to compare
    pub fn empty(name: impl Into<String>) -> Self {
        Self::compare(name, &[], &[], &VerificationConfig::default())
    }
}

/// Owned copy of the point data that can be perturbed entry by entry
#[derive(Debug, Clone)]
struct PointState {
    elem_index: usize,
    time: f64,
    quad_index: usize,
    pt: Vec<f64>,
    x: Vec<f64>,
    ut: Vec<f64>,
    ux: Vec<f64>,
}

impl PointState {
    fn from_point(point: &EvalPoint<'_>) -> Self {
        Self {
            elem_index: point.elem_index,
            time: point.time,
            quad_index: point.quad_index,
            pt: point.pt.to_vec(),
            x: point.x.to_vec(),
            ut: point.ut.to_vec(),
            ux: point.ux.to_vec(),
        }
    }

    fn point(&self) -> EvalPoint<'_> {
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

/// Point residual paired with the adjoint:
/// `Σ_k ψ_k (DUt[3k] + DUt[3k+1] + DUt[3k+2] + DUx[k(d+1)]) + Σ ψx · DUx[spatial]`
pub fn adjoint_residual<M: ElementModel + ?Sized>(
    model: &M,
    point: &EvalPoint<'_>,
    psi: &[f64],
    psix: &[f64],
) -> Result<f64> {
    model.check_adjoint(psi, psix)?;
    let dims = model.dims();
    let mut dut = vec![0.0; dims.ut_len()];
    let mut dux = vec![0.0; dims.ux_len()];
    model.eval_weak_integrand(point, &mut dut, &mut dux)?;

    let d = dims.spatial_dim();
    let mut r = 0.0;
    for k in 0..dims.vars_per_node() {
        r += psi[k] * (dut[3 * k] + dut[3 * k + 1] + dut[3 * k + 2] + dux[k * (d + 1)]);
        for j in 0..d {
            r += psix[k * d + j] * dux[dims.ux_index(k, j)];
        }
    }
    Ok(r)
}

/// Jacobian row `row` gathered from the weak-form coefficients
fn jacobian_row<M: ElementModel + ?Sized>(model: &M, dut: &[f64], dux: &[f64], row: usize) -> f64 {
    let dims = model.dims();
    let (k, slot) = (row / dims.block_size(), row % dims.block_size());
    match slot {
        0 => dut[3 * k] + dux[k * (dims.spatial_dim() + 1)],
        1 | 2 => dut[3 * k + slot],
        _ => dux[dims.ux_index(k, slot - 3)],
    }
}

/// Applies `delta` to the state entry behind Jacobian column `col`
fn perturb_column<M: ElementModel + ?Sized>(model: &M, state: &mut PointState, col: usize, delta: f64) {
    let dims = model.dims();
    let (k, slot) = (col / dims.block_size(), col % dims.block_size());
    match slot {
        0 => {
            state.ut[3 * k] += delta;
            state.ux[k * (dims.spatial_dim() + 1)] += delta;
        }
        1 | 2 => state.ut[3 * k + slot] += delta,
        _ => state.ux[dims.ux_index(k, slot - 3)] += delta,
    }
}

/// Compares the weak-form Jacobian with central differences of the integrand
pub fn check_weak_jacobian<M: ElementModel + ?Sized>(
    model: &M,
    point: &EvalPoint<'_>,
    config: &VerificationConfig,
) -> Result<CheckResult> {
    let dims = model.dims();
    let size = dims.jacobian_size();
    let mut dut = vec![0.0; dims.ut_len()];
    let mut dux = vec![0.0; dims.ux_len()];
    let mut values = vec![0.0; size * size];
    let pattern = model.eval_weak_jacobian(point, &mut dut, &mut dux, &mut values)?;
    let analytic = JacobianView::new(size, pattern, &values)?.to_dense();

    let h = config.step_size;
    let mut state = PointState::from_point(point);
    let (mut dut_p, mut dux_p) = (dut.clone(), dux.clone());
    let (mut dut_m, mut dux_m) = (dut.clone(), dux.clone());
    let mut fd = vec![0.0; size * size];
    for col in 0..size {
        perturb_column(model, &mut state, col, h);
        model.eval_weak_integrand(&state.point(), &mut dut_p, &mut dux_p)?;
        perturb_column(model, &mut state, col, -2.0 * h);
        model.eval_weak_integrand(&state.point(), &mut dut_m, &mut dux_m)?;
        perturb_column(model, &mut state, col, h);

        for row in 0..size {
            let plus = jacobian_row(model, &dut_p, &dux_p, row);
            let minus = jacobian_row(model, &dut_m, &dux_m, row);
            fd[row * size + col] = (plus - minus) / (2.0 * h);
        }
    }

    let analytic: Vec<f64> = (0..size * size)
        .map(|i| analytic[(i / size, i % size)])
        .collect();
    Ok(CheckResult::compare("weak jacobian", &analytic, &fd, config))
}

/// Runs `f` with the element's design variables shifted by `delta` in entry
/// `i`, then restores them
fn with_shifted_design_var<M, T>(
    model: &mut M,
    elem_index: usize,
    base: &[f64],
    i: usize,
    delta: f64,
    f: impl FnOnce(&M) -> Result<T>,
) -> Result<T>
where
    M: ElementModel + ?Sized,
{
    let mut shifted = base.to_vec();
    shifted[i] += delta;
    model.set_design_vars(elem_index, &shifted)?;
    let out = f(&*model);
    model.set_design_vars(elem_index, base)?;
    out
}

/// Same as [`with_shifted_design_var`] for a constitutive object
fn with_shifted_constitutive_var<C, T>(
    con: &mut C,
    elem_index: usize,
    base: &[f64],
    i: usize,
    delta: f64,
    f: impl FnOnce(&C) -> Result<T>,
) -> Result<T>
where
    C: Constitutive + ?Sized,
{
    let mut shifted = base.to_vec();
    shifted[i] += delta;
    con.set_design_vars(elem_index, &shifted)?;
    let out = f(&*con);
    con.set_design_vars(elem_index, base)?;
    out
}

/// Current design variables of a model's element
fn model_design_vars<M: ElementModel + ?Sized>(model: &M, elem_index: usize) -> Result<Vec<f64>> {
    let n = model.design_var_nums(elem_index, None)?;
    let mut dvs = vec![0.0; n];
    model.design_vars(elem_index, &mut dvs)?;
    Ok(dvs)
}

/// Compares `add_weak_adj_product` with central differences of the
/// adjoint-weighted residual in each design variable
pub fn check_weak_adj_product<M: ElementModel + ?Sized>(
    model: &mut M,
    point: &EvalPoint<'_>,
    psi: &[f64],
    psix: &[f64],
    config: &VerificationConfig,
) -> Result<CheckResult> {
    let elem = point.elem_index;
    let base = model_design_vars(model, elem)?;
    let mut analytic = vec![0.0; base.len()];
    model.add_weak_adj_product(point, psi, psix, 1.0, &mut analytic)?;

    let h = config.step_size;
    let mut fd = vec![0.0; base.len()];
    for i in 0..base.len() {
        let plus = with_shifted_design_var(model, elem, &base, i, h, |m| adjoint_residual(m, point, psi, psix))?;
        let minus = with_shifted_design_var(model, elem, &base, i, -h, |m| adjoint_residual(m, point, psi, psix))?;
        fd[i] = (plus - minus) / (2.0 * h);
    }
    Ok(CheckResult::compare("weak adjoint product", &analytic, &fd, config))
}

/// Weights `1, 1/2, 1/3, ...` applied to the components of a quantity
fn quantity_weights(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 / (i + 1) as f64).collect()
}

/// `dfdqᵀ q` at the given point
fn weighted_quantity<M: ElementModel + ?Sized>(
    model: &M,
    quantity: QuantityType,
    point: &EvalPoint<'_>,
    xd: &[f64],
    dfdq: &[f64],
) -> Result<f64> {
    let mut q = [0.0; QuantityType::MAX_LEN];
    let n = model.eval_point_quantity(quantity, point, xd, &mut q)?;
    Ok(q[..n].iter().zip(dfdq).map(|(q, w)| q * w).sum())
}

/// Compares `eval_point_quantity_sens` with central differences in `x`, `ut`
/// and `ux`
pub fn check_point_quantity_sens<M: ElementModel + ?Sized>(
    model: &M,
    quantity: QuantityType,
    point: &EvalPoint<'_>,
    xd: &[f64],
    config: &VerificationConfig,
) -> Result<CheckResult> {
    let mut q = [0.0; QuantityType::MAX_LEN];
    let n = model.eval_point_quantity(quantity, point, xd, &mut q)?;
    let dfdq = quantity_weights(n);

    let mut sens = QuantitySens::new(model.dims());
    model.eval_point_quantity_sens(quantity, point, xd, &dfdq, &mut sens)?;
    let analytic: Vec<f64> = sens
        .dfdx
        .iter()
        .chain(&sens.dfdut)
        .chain(&sens.dfdux)
        .copied()
        .collect();

    let h = config.step_size;
    let mut state = PointState::from_point(point);
    let mut fd = Vec::with_capacity(analytic.len());
    let sizes = [NUM_COORDS, state.ut.len(), state.ux.len()];
    for (field, &len) in sizes.iter().enumerate() {
        for i in 0..len {
            let original = field_value(&state, field, i);
            set_field(&mut state, field, i, original + h);
            let plus = weighted_quantity(model, quantity, &state.point(), xd, &dfdq);
            set_field(&mut state, field, i, original - h);
            let minus = weighted_quantity(model, quantity, &state.point(), xd, &dfdq);
            set_field(&mut state, field, i, original);
            fd.push((plus? - minus?) / (2.0 * h));
        }
    }

    let name = format!("point quantity {quantity} state sensitivity");
    Ok(CheckResult::compare(name, &analytic, &fd, config))
}

fn field_value(state: &PointState, field: usize, i: usize) -> f64 {
    match field {
        0 => state.x[i],
        1 => state.ut[i],
        _ => state.ux[i],
    }
}

fn set_field(state: &mut PointState, field: usize, i: usize, value: f64) {
    match field {
        0 => state.x[i] = value,
        1 => state.ut[i] = value,
        _ => state.ux[i] = value,
    }
}

/// Compares `add_point_quantity_dv_sens` with central differences in each
/// design variable
pub fn check_point_quantity_dv_sens<M: ElementModel + ?Sized>(
    model: &mut M,
    quantity: QuantityType,
    point: &EvalPoint<'_>,
    xd: &[f64],
    config: &VerificationConfig,
) -> Result<CheckResult> {
    let mut q = [0.0; QuantityType::MAX_LEN];
    let n = model.eval_point_quantity(quantity, point, xd, &mut q)?;
    let dfdq = quantity_weights(n);

    let elem = point.elem_index;
    let base = model_design_vars(model, elem)?;
    let mut analytic = vec![0.0; base.len()];
    model.add_point_quantity_dv_sens(quantity, 1.0, point, xd, &dfdq, &mut analytic)?;

    let h = config.step_size;
    let mut fd = vec![0.0; base.len()];
    for i in 0..base.len() {
        let plus = with_shifted_design_var(model, elem, &base, i, h, |m| {
            weighted_quantity(m, quantity, point, xd, &dfdq)
        })?;
        let minus = with_shifted_design_var(model, elem, &base, i, -h, |m| {
            weighted_quantity(m, quantity, point, xd, &dfdq)
        })?;
        fd[i] = (plus - minus) / (2.0 * h);
    }

    let name = format!("point quantity {quantity} design sensitivity");
    Ok(CheckResult::compare(name, &analytic, &fd, config))
}

/// Compares `eval_failure_strain_sens` with central differences of
/// `eval_failure`
pub fn check_failure_strain_sens<C: Constitutive + ?Sized>(
    con: &C,
    elem_index: usize,
    pt: &[f64],
    x: &[f64],
    strain: &[f64],
    config: &VerificationConfig,
) -> Result<CheckResult> {
    let ns = con.num_stresses();
    check_len("strain", strain.len(), ns)?;
    let mut analytic = vec![0.0; ns];
    con.eval_failure_strain_sens(elem_index, pt, x, strain, &mut analytic)?;

    let h = config.step_size;
    let mut e = strain.to_vec();
    let mut fd = vec![0.0; ns];
    for i in 0..ns {
        e[i] = strain[i] + h;
        let plus = con.eval_failure(elem_index, pt, x, &e)?;
        e[i] = strain[i] - h;
        let minus = con.eval_failure(elem_index, pt, x, &e)?;
        e[i] = strain[i];
        fd[i] = (plus - minus) / (2.0 * h);
    }
    Ok(CheckResult::compare("failure strain sensitivity", &analytic, &fd, config))
}

/// `psiᵀ (C·strain)` with `C` the packed tangent of `con`
fn weighted_tangent_stress<C: Constitutive + ?Sized>(
    con: &C,
    elem_index: usize,
    pt: &[f64],
    x: &[f64],
    strain: &[f64],
    psi: &[f64],
) -> Result<f64> {
    check_len("strain", strain.len(), 6)?;
    let mut packed = [0.0; NUM_STIFFNESS_ENTRIES];
    con.eval_tangent_stiffness(elem_index, pt, x, &mut packed)?;
    let c = SymmetricStiffness(packed);
    let mut product = 0.0;
    for i in 0..6 {
        for j in 0..6 {
            product += psi[i] * c.get(i, j) * strain[j];
        }
    }
    Ok(product)
}

/// Compares `add_stress_dv_sens` with central differences of `psiᵀ(C·e)`,
/// `C` being the tangent operator
pub fn check_stress_dv_sens<C: Constitutive + ?Sized>(
    con: &mut C,
    elem_index: usize,
    pt: &[f64],
    x: &[f64],
    strain: &[f64],
    psi: &[f64],
    config: &VerificationConfig,
) -> Result<CheckResult> {
    check_len("psi", psi.len(), 6)?;
    let n = con.design_var_nums(elem_index, None)?;
    let mut base = vec![0.0; n];
    con.design_vars(elem_index, &mut base)?;
    let mut analytic = vec![0.0; n];
    con.add_stress_dv_sens(elem_index, 1.0, pt, x, strain, psi, &mut analytic)?;

    let weighted = |c: &C| weighted_tangent_stress(c, elem_index, pt, x, strain, psi);

    let h = config.step_size;
    let mut fd = vec![0.0; n];
    for i in 0..n {
        let plus = with_shifted_constitutive_var(con, elem_index, &base, i, h, weighted)?;
        let minus = with_shifted_constitutive_var(con, elem_index, &base, i, -h, weighted)?;
        fd[i] = (plus - minus) / (2.0 * h);
    }
    Ok(CheckResult::compare("stress design sensitivity", &analytic, &fd, config))
}

/// Compares the packed tangent stiffness with `factor` times the central
/// differences of `eval_stress`.
///
/// `factor` is the scaling the constitutive applies to its tangent, e.g. the
/// thickness of a [`crate::SolidConstitutive`].
pub fn check_tangent_stiffness<C: Constitutive + ?Sized>(
    con: &C,
    elem_index: usize,
    pt: &[f64],
    x: &[f64],
    strain: &[f64],
    factor: f64,
    config: &VerificationConfig,
) -> Result<CheckResult> {
    check_len("strain", strain.len(), 6)?;
    let mut packed = [0.0; NUM_STIFFNESS_ENTRIES];
    con.eval_tangent_stiffness(elem_index, pt, x, &mut packed)?;
    let c = SymmetricStiffness(packed);
    let analytic: Vec<f64> = (0..36).map(|i| c.get(i / 6, i % 6)).collect();

    let h = config.step_size;
    let mut e = strain.to_vec();
    let (mut plus, mut minus) = ([0.0; 6], [0.0; 6]);
    let mut fd = vec![0.0; 36];
    for j in 0..6 {
        e[j] = strain[j] + h;
        con.eval_stress(elem_index, pt, x, &e, &mut plus)?;
        e[j] = strain[j] - h;
        con.eval_stress(elem_index, pt, x, &e, &mut minus)?;
        e[j] = strain[j];
        for i in 0..6 {
            fd[i * 6 + j] = factor * (plus[i] - minus[i]) / (2.0 * h);
        }
    }
    Ok(CheckResult::compare("tangent stiffness", &analytic, &fd, config))
}

/// Compares the packed conduction tangent with `factor` times the central
/// differences of `eval_heat_flux`
pub fn check_tangent_heat_flux<C: Constitutive + ?Sized>(
    con: &C,
    elem_index: usize,
    pt: &[f64],
    x: &[f64],
    grad: &[f64],
    factor: f64,
    config: &VerificationConfig,
) -> Result<CheckResult> {
    check_len("gradient", grad.len(), 2)?;
    let mut k = [0.0; NUM_CONDUCTION_ENTRIES];
    con.eval_tangent_heat_flux(elem_index, pt, x, &mut k)?;
    let analytic = [k[0], k[1], k[1], k[2]];

    let h = config.step_size;
    let mut g = grad.to_vec();
    let (mut plus, mut minus) = ([0.0; 2], [0.0; 2]);
    let mut fd = [0.0; 4];
    for j in 0..2 {
        g[j] = grad[j] + h;
        con.eval_heat_flux(elem_index, pt, x, &g, &mut plus)?;
        g[j] = grad[j] - h;
        con.eval_heat_flux(elem_index, pt, x, &g, &mut minus)?;
        g[j] = grad[j];
        for i in 0..2 {
            fd[i * 2 + j] = factor * (plus[i] - minus[i]) / (2.0 * h);
        }
    }
    Ok(CheckResult::compare("heat flux tangent", &analytic, &fd, config))
}

/// Reciprocity of the stress map: `aᵀσ(b) = bᵀσ(a)`
pub fn check_stiffness_symmetry<C: Constitutive + ?Sized>(
    con: &C,
    elem_index: usize,
    pt: &[f64],
    x: &[f64],
    strain_a: &[f64],
    strain_b: &[f64],
    config: &VerificationConfig,
) -> Result<CheckResult> {
    let ns = con.num_stresses();
    let (mut sa, mut sb) = (vec![0.0; ns], vec![0.0; ns]);
    con.eval_stress(elem_index, pt, x, strain_a, &mut sa)?;
    con.eval_stress(elem_index, pt, x, strain_b, &mut sb)?;
    let a_sb: f64 = strain_a.iter().zip(&sb).map(|(e, s)| e * s).sum();
    let b_sa: f64 = strain_b.iter().zip(&sa).map(|(e, s)| e * s).sum();
    Ok(CheckResult::compare("stiffness symmetry", &[a_sb], &[b_sa], config))
}
