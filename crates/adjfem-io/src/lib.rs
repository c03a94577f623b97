//! I/O support for adjfem.
//!
//! This crate provides:
//! - **JSON case files**: materials, element models with their constitutive
//!   binding, verification settings and the quantities to check
//! - **Verification runner** that builds every element of a case and checks
//!   its analytic derivatives against finite differences
//! - **Report writers** (JSON and plain text)

mod case;
pub mod error;
mod report;
mod verify;

pub use case::{
    load_case, save_case, BuiltElement, CaseFile, ConstitutiveSpec, ElasticSpec, ElementSpec,
    MaterialSpec, ModelSpec, CASE_SCHEMA_VERSION,
};
pub use error::{IoError, Result};
pub use report::{
    load_json_report, write_json_report, write_text_report, ElementReport, VerificationReport,
};
pub use verify::{sample_adjoint, sample_point, verify_case, verify_element};
