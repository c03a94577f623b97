/// Consistency of the element models with their own derivatives
///
/// Each analytic Jacobian, adjoint product and point-quantity sensitivity
/// is checked against central differences of the forward evaluation.
use std::sync::Arc;

use adjfem_core::{
    adjoint_residual, check_point_quantity_dv_sens, check_point_quantity_sens,
    check_weak_adj_product, check_weak_jacobian, ElementModel, EvalPoint, HeatConduction2D,
    JacobianView, LinearElasticity3D, MaterialProperties, QuantityType, SharedMaterial,
    SolidConstitutive, VerificationConfig,
};

fn aluminium() -> SharedMaterial {
    Arc::new(
        MaterialProperties::isotropic("Aluminium", 2700.0, 70e9, 0.3, 270e6)
            .unwrap()
            .with_specific_heat(921.0)
            .with_thermal_expansion(23e-6)
            .with_conduction_2d(230.0, 15.0, 190.0),
    )
}

fn elasticity(theta: f64) -> LinearElasticity3D {
    let con = SolidConstitutive::new(Some(aluminium()), 1.25, Some(0), 0.1, 10.0);
    LinearElasticity3D::with_thermal_load(con, theta)
}

fn conduction() -> HeatConduction2D {
    HeatConduction2D::new(SolidConstitutive::new(Some(aluminium()), 0.6, Some(0), 0.1, 10.0))
}

/// Deterministic uniform samples in `[-1, 1)` (splitmix64)
struct Sampler(u64);

impl Sampler {
    fn uniform(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        2.0 * (z >> 11) as f64 / (1u64 << 53) as f64 - 1.0
    }
}

const SEEDS: [u64; 4] = [1, 17, 4242, 90210];

struct Solid3DState {
    ut: [f64; 9],
    ux: [f64; 12],
}

impl Solid3DState {
    fn new() -> Self {
        Self {
            ut: [1e-4, 2e-3, 3.0, -2e-4, -1e-3, -2.0, 5e-5, 4e-3, 0.5],
            ux: [
                1e-4, 8e-4, 2e-4, -3e-4, //
                -2e-4, 5e-4, -6e-4, 4e-4, //
                5e-5, 1e-4, 3e-4, 1.1e-3,
            ],
        }
    }

    /// Displacements near 1e-4, velocities near 1e-3, accelerations near 1
    fn seeded(seed: u64) -> Self {
        let mut rng = Sampler(seed);
        let mut ut = [0.0; 9];
        for (k, v) in ut.iter_mut().enumerate() {
            let scale = [1e-4, 1e-3, 1.0][k % 3];
            *v = scale * rng.uniform();
        }
        let mut ux = [0.0; 12];
        for v in ux.iter_mut() {
            *v = 1e-3 * rng.uniform();
        }
        Self { ut, ux }
    }

    fn point(&self) -> EvalPoint<'_> {
        EvalPoint {
            elem_index: 0,
            time: 0.0,
            quad_index: 3,
            pt: &[0.1, -0.2, 0.3],
            x: &[1.0, 0.5, -0.25],
            ut: &self.ut,
            ux: &self.ux,
        }
    }
}

struct ThermalState {
    ut: [f64; 3],
    ux: [f64; 3],
}

impl ThermalState {
    fn new() -> Self {
        Self {
            ut: [320.0, 1.75, 0.0],
            ux: [320.0, 14.0, -6.5],
        }
    }

    fn seeded(seed: u64) -> Self {
        let mut rng = Sampler(seed);
        let temperature = 300.0 + 50.0 * rng.uniform();
        Self {
            ut: [temperature, 2.0 * rng.uniform(), 0.0],
            ux: [temperature, 20.0 * rng.uniform(), 20.0 * rng.uniform()],
        }
    }

    fn point(&self) -> EvalPoint<'_> {
        EvalPoint {
            elem_index: 0,
            time: 1.0,
            quad_index: 0,
            pt: &[0.5, 0.5],
            x: &[0.2, 0.1, 0.0],
            ut: &self.ut,
            ux: &self.ux,
        }
    }
}

#[test]
fn test_elasticity_jacobian_matches_finite_difference() {
    let config = VerificationConfig::default();
    let states = std::iter::once(Solid3DState::new()).chain(SEEDS.map(Solid3DState::seeded));
    for (i, state) in states.enumerate() {
        for theta in [0.0, 40.0] {
            let model = elasticity(theta);
            let result = check_weak_jacobian(&model, &state.point(), &config).unwrap();
            println!("state {i}, theta = {theta}: {:?}", result);
            assert!(result.passed);
            assert_eq!(result.entries, 18 * 18);
        }
    }
}

#[test]
fn test_conduction_jacobian_matches_finite_difference() {
    let config = VerificationConfig::default();
    let model = conduction();
    let states = std::iter::once(ThermalState::new()).chain(SEEDS.map(ThermalState::seeded));
    for (i, state) in states.enumerate() {
        let result = check_weak_jacobian(&model, &state.point(), &config).unwrap();
        assert!(result.passed, "state {i}: {:?}", result);
    }
}

#[test]
fn test_seeded_states_are_reproducible() {
    let a = Solid3DState::seeded(SEEDS[2]);
    let b = Solid3DState::seeded(SEEDS[2]);
    assert_eq!(a.ux, b.ux);
    assert_ne!(a.ux, Solid3DState::seeded(SEEDS[3]).ux);
    assert!(a.ux.iter().all(|v| v.abs() < 1e-3));
}

#[test]
fn test_zero_material_jacobian_is_zero() {
    let model = LinearElasticity3D::new(SolidConstitutive::new(None, 1.0, None, 1.0, 1.0));
    let state = Solid3DState::new();
    let (mut dut, mut dux) = ([1.0; 9], [1.0; 12]);
    let mut jac = vec![1.0; 18 * 18];
    let pattern = model
        .eval_weak_jacobian(&state.point(), &mut dut, &mut dux, &mut jac)
        .unwrap();
    let view = JacobianView::new(18, pattern, &jac).unwrap();
    assert!(view.iter().all(|(_, _, v)| v == 0.0));
    assert!(dut.iter().chain(&dux).all(|v| *v == 0.0));
}

#[test]
fn test_jacobian_converts_to_sparse_coordinates() {
    let model = elasticity(0.0);
    let state = Solid3DState::new();
    let (mut dut, mut dux) = ([0.0; 9], [0.0; 12]);
    let mut jac = vec![0.0; model.jacobian_size().pow(2)];
    let pattern = model
        .eval_weak_jacobian(&state.point(), &mut dut, &mut dux, &mut jac)
        .unwrap();
    let view = JacobianView::new(model.jacobian_size(), pattern, &jac).unwrap();
    let coo = view.to_coo();
    assert_eq!(coo.nrows(), 18);
    assert_eq!(coo.nnz(), 84);

    // mass block of u sits on the second time derivative
    assert!((view.get(2, 2) - 1.25 * 2700.0).abs() < 1e-9);
    // ∂σ_xx/∂u_x = C11
    let c11 = 1.25 * 70e9 * 0.7 / (1.3 * 0.4);
    assert!((view.get(3, 3) - c11).abs() < 1e-6 * c11);
}

#[test]
fn test_adjoint_product_matches_finite_difference() {
    let config = VerificationConfig::default();

    let state = Solid3DState::new();
    let psi = [0.7, -1.2, 0.4];
    let psix = [0.3, -0.5, 1.1, 0.8, 0.2, -0.9, -0.4, 0.6, 0.25];
    for theta in [0.0, 25.0] {
        let mut model = elasticity(theta);
        let result = check_weak_adj_product(&mut model, &state.point(), &psi, &psix, &config).unwrap();
        assert!(result.passed, "{:?}", result);
        assert_eq!(result.entries, 1);

        let mut t = [0.0];
        model.design_vars(0, &mut t).unwrap();
        assert_eq!(t, [1.25]);
    }

    let state = ThermalState::new();
    let mut model = conduction();
    let result = check_weak_adj_product(&mut model, &state.point(), &[1.3], &[0.4, -2.0], &config).unwrap();
    assert!(result.passed, "{:?}", result);
}

#[test]
fn test_adjoint_product_accumulates() {
    let model = conduction();
    let state = ThermalState::new();
    let point = state.point();
    let (psi, psix) = ([1.3], [0.4, -2.0]);

    let mut once = [0.0];
    model.add_weak_adj_product(&point, &psi, &psix, 1.0, &mut once).unwrap();
    let mut twice = [5.0];
    model.add_weak_adj_product(&point, &psi, &psix, 0.5, &mut twice).unwrap();
    model.add_weak_adj_product(&point, &psi, &psix, 0.5, &mut twice).unwrap();
    assert!((twice[0] - 5.0 - once[0]).abs() <= 1e-9 * once[0].abs());

    let r = adjoint_residual(&model, &point, &psi, &psix).unwrap();
    assert!(r.is_finite());
}

#[test]
fn test_point_quantity_sensitivities_match_finite_difference() {
    // Failure is not polynomial in the strain, which is O(1e-3)
    let fine = VerificationConfig {
        step_size: 1e-8,
        ..Default::default()
    };
    let config = VerificationConfig::default();

    let state = Solid3DState::new();
    let mut model = elasticity(15.0);
    for quantity in [
        QuantityType::FAILURE_INDEX,
        QuantityType::DENSITY,
        QuantityType::STRAIN_ENERGY_DENSITY,
    ] {
        let result = check_point_quantity_sens(&model, quantity, &state.point(), &[], &fine).unwrap();
        assert!(result.passed, "{:?}", result);
        let result = check_point_quantity_dv_sens(&mut model, quantity, &state.point(), &[], &fine).unwrap();
        assert!(result.passed, "{:?}", result);
    }

    let state = ThermalState::new();
    let mut model = conduction();
    for quantity in [
        QuantityType::DENSITY,
        QuantityType::TEMPERATURE,
        QuantityType::HEAT_FLUX,
    ] {
        let result = check_point_quantity_sens(&model, quantity, &state.point(), &[], &config).unwrap();
        assert!(result.passed, "{:?}", result);
        let result = check_point_quantity_dv_sens(&mut model, quantity, &state.point(), &[], &config).unwrap();
        assert!(result.passed, "{:?}", result);
    }
}

#[test]
fn test_unsupported_quantities_fail_every_check() {
    let config = VerificationConfig::default();
    let state = ThermalState::new();
    let mut model = conduction();
    let tag = QuantityType(QuantityType::FIRST_USER_TAG + 7);
    assert!(check_point_quantity_sens(&model, tag, &state.point(), &[], &config).is_err());
    assert!(check_point_quantity_dv_sens(&mut model, tag, &state.point(), &[], &config).is_err());
}
