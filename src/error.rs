// src/error.rs

use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`. Returned by the linear algebra backends.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Convenience alias used by every imputer and transform in this crate.
pub type Result<T> = std::result::Result<T, ImputationError>;

/// Everything that can go wrong while imputing or transforming a matrix.
///
/// Errors are raised synchronously by the call that detects them. Non-mutating entry points
/// leave the caller's data untouched on error; `_inplace` entry points may have partially
/// filled the matrix before failing.
#[derive(Debug, Error)]
pub enum ImputationError {
    /// A targeted slice has no observed values, so the statistic it needs is undefined.
    /// `axis` is the axis the slice runs along (`None` for the whole array) and `index`
    /// is the flat index of the slice among all slices along that axis.
    #[error("slice {index} along axis {axis:?} has no observed values")]
    AllMissingSlice { axis: Option<usize>, index: usize },

    /// A parameter is outside its valid range.
    #[error("invalid argument `{parameter}`: {reason}")]
    InvalidArgument {
        parameter: &'static str,
        reason: String,
    },

    /// The requested axis does not exist for an array of this rank.
    #[error("axis {requested} does not exist for an array with {ndim} dimension(s)")]
    InvalidDimension { requested: usize, ndim: usize },

    /// A statistic produced a value that the element type cannot store exactly.
    #[error("statistic value {value} cannot be stored as {element}")]
    StatisticTypeMismatch { value: f64, element: &'static str },

    /// Zero or undefined spread made the fitted distribution degenerate. `index` is the
    /// sample or slice at fault, or `None` when the spread is pooled over the whole matrix.
    #[error("degenerate spread in {context} (slice {index:?}): {detail}")]
    NumericDegeneracy {
        context: &'static str,
        index: Option<usize>,
        detail: String,
    },

    /// A table-oriented operation was called on a container that does not provide it.
    #[error("capability `{capability}` is not provided by this container")]
    CapabilityUnavailable { capability: &'static str },

    /// An internal invariant failed. Always a bug.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// An imputer returned with missing cells still present. Always a bug.
    #[error("{remaining} cell(s) are still missing after imputation")]
    Incomplete { remaining: usize },

    /// The linear algebra backend failed (e.g. SVD did not converge).
    #[error("linear algebra backend failed: {0}")]
    Linalg(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl ImputationError {
    pub(crate) fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        ImputationError::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }
}

impl From<ThreadSafeStdError> for ImputationError {
    fn from(err: ThreadSafeStdError) -> Self {
        ImputationError::Linalg(err.to_string())
    }
}

/// What distributional imputers and robust transforms do when the spread they need is zero
/// or undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DegenerateSpreadPolicy {
    /// Return `ImputationError::NumericDegeneracy`.
    #[default]
    Fail,
    /// Log a warning and write `NaN` into every cell the degenerate fit would have produced.
    PropagateNan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_offending_slice() {
        let err = ImputationError::AllMissingSlice { axis: Some(1), index: 3 };
        let message = err.to_string();
        assert!(message.contains("slice 3"), "message was: {}", message);
        assert!(message.contains("Some(1)"), "message was: {}", message);
    }

    #[test]
    fn pooled_degeneracy_names_no_slice() {
        let err = ImputationError::NumericDegeneracy {
            context: "MinProb",
            index: None,
            detail: "pooled feature standard deviation is 0".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("slice None"), "message was: {}", message);
    }

    #[test]
    fn backend_errors_convert_to_linalg() {
        let backend_err: ThreadSafeStdError = "SVD did not converge".into();
        let err: ImputationError = backend_err.into();
        assert!(matches!(err, ImputationError::Linalg(ref m) if m.contains("converge")));
    }
}
