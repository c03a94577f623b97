//! Error types for adjfem-core

use thiserror::Error;

use crate::quantity::QuantityType;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Contract violations detected by the element and constitutive evaluators.
///
/// An unbound material is not an error: it evaluates to zero stress, zero
/// density and zero failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{what}: expected length {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: buffer holds {actual} values, at least {required} required")]
    BufferTooShort {
        what: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("invalid model dimensions: spatial_dim={spatial_dim}, vars_per_node={vars_per_node}")]
    InvalidDimensions {
        spatial_dim: usize,
        vars_per_node: usize,
    },

    #[error("unsupported point quantity: {0}")]
    UnsupportedQuantity(QuantityType),

    #[error("quantity tag {tag} already registered as '{existing}'")]
    QuantityCollision { tag: QuantityType, existing: String },

    #[error("Jacobian pattern has {pairs} entries but {values} values were supplied")]
    JacobianMismatch { pairs: usize, values: usize },

    #[error("Jacobian entry ({row}, {col}) lies outside the {size}x{size} block")]
    JacobianIndexOutOfRange { row: usize, col: usize, size: usize },

    #[error("invalid material: {0}")]
    InvalidMaterial(String),
}

/// Fails unless `actual == expected`.
pub(crate) fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ModelError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Fails unless `actual >= required`.
pub(crate) fn check_min_len(what: &'static str, actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(ModelError::BufferTooShort {
            what,
            required,
            actual,
        });
    }
    Ok(())
}
