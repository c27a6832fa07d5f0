//! Error handling for modckks
//!
//! A single error enum shared by the ring layer, the module algebra, key
//! switching and the scheme. Every fallible operation returns [`Result`].

use thiserror::Error;

/// Errors raised by module CKKS operations.
#[derive(Error, Debug)]
pub enum ModckksError {
    /// Shape, rank, format or tower-count disagreement between operands.
    #[error("DimensionMismatch: {0}")]
    DimensionMismatch(String),

    /// Operation not available for module elements or for this scheme.
    #[error("UnsupportedOperation: {0}")]
    UnsupportedOperation(String),

    /// Decryption met a ciphertext without CRT towers.
    ///
    /// Evaluation never produces one: running out of multiplicative depth
    /// fails earlier, when the rescale refuses to drop the last tower, and
    /// is reported as [`ModckksError::DimensionMismatch`].
    #[error("PrecisionExhausted: {0}")]
    PrecisionExhausted(String),

    /// Noise-scale degrees cannot be aligned under manual rescaling.
    #[error("DepthMismatch: {0}")]
    DepthMismatch(String),

    #[error("InvalidParameters: {0}")]
    InvalidParameters(String),

    /// A required evaluation key has not been generated.
    #[error("MissingKey: {0}")]
    MissingKey(String),

    #[error("FeatureNotEnabled: {0}")]
    FeatureNotEnabled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for modckks operations
pub type Result<T> = std::result::Result<T, ModckksError>;

/// Create a ModckksError variant with format string support
macro_rules! modckks_err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::error::ModckksError::$variant(format!($($arg)*))
    };
}

pub(crate) use modckks_err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_kind() {
        let err = modckks_err!(DimensionMismatch, "rows {} vs {}", 2, 3);
        assert_eq!(err.to_string(), "DimensionMismatch: rows 2 vs 3");
    }

    #[test]
    fn test_from_json_error() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("{");
        let err: ModckksError = parse.unwrap_err().into();
        assert!(matches!(err, ModckksError::Json(_)));
    }
}
