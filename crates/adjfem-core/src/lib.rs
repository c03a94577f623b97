//! Element-model and constitutive core for adjoint-based finite element
//! design optimization.
//!
//! This crate provides:
//! - **Materials**: shared, immutable property sets (stiffness, conduction,
//!   thermal strain, failure)
//! - **Constitutive contract** with a thickness-parameterized solid implementation
//! - **Element-model contract**: weak-form integrand, exact Jacobian, adjoint
//!   design products and point quantities, independent of the basis
//! - **Element models**: 3-D linear elasticity and 2-D heat conduction
//! - **Finite-difference verification** of every analytic derivative
//! - **Batch evaluation** over many points with rayon
//!
//! Meshes, shape functions, assembly and solvers are supplied by the caller.

pub mod batch;
pub mod constitutive;
pub mod elements;
pub mod error;
pub mod materials;
pub mod output;
pub mod quantity;
pub mod verification;

pub use batch::{
    par_eval_weak_integrand, par_integrate_quantity, par_point_quantity, par_weak_adj_product,
    weak_adj_product, AdjointSample, PointSample, WeakCoefficients,
};
pub use constitutive::{Constitutive, SolidConstitutive};
pub use elements::{
    ElementModel, EvalPoint, HeatConduction2D, JacobianPattern, JacobianView, LinearElasticity3D,
    ModelDims, QuantitySens,
};
pub use error::{ModelError, Result};
pub use materials::{
    MaterialLibrary, MaterialProperties, MaterialSymmetry, SharedMaterial, SymmetricStiffness,
};
pub use output::{ElementType, OutputFlags};
pub use quantity::{QuantityInfo, QuantityRegistry, QuantityType};
pub use verification::{
    adjoint_residual, check_failure_strain_sens, check_point_quantity_dv_sens,
    check_point_quantity_sens, check_stiffness_symmetry, check_stress_dv_sens,
    check_tangent_heat_flux, check_tangent_stiffness, check_weak_adj_product, check_weak_jacobian,
    CheckResult, VerificationConfig,
};
