//! Error types for tinyconv-core.
//!
//! All checks happen while a plan is being built (or once on entry to a
//! primitive). The per-element loops never branch on error conditions, so a
//! plan that builds successfully runs to completion for every correctly sized
//! image.

use alloc::string::String;

use crate::tensor::Shape;

/// Every failure the library can report. Variants that concern a plan stage
/// carry the stage name so the offending layer can be found without a debugger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CnnError {
    #[error("stage `{stage}`: expected shape {expected}, got {actual}")]
    ShapeMismatch {
        stage: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("stage `{stage}`: buffer `{buffer}` needs {required} floats but holds {available}")]
    BufferCapacityExceeded {
        stage: String,
        buffer: String,
        required: usize,
        available: usize,
    },

    #[error("parameter `{name}`: expected {expected} values, got {actual}")]
    ParameterLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("parameter `{name}` is not bound")]
    MissingParameter { name: String },

    #[error("stage `{stage}`: invalid window ({reason})")]
    InvalidWindow { stage: String, reason: &'static str },

    #[error("stage `{stage}`: buffer `{buffer}` was overwritten before this stage read it")]
    StaleTensor { stage: String, buffer: String },

    #[error("stage `{stage}`: buffer `{buffer}` is both read and written")]
    BufferAliasing { stage: String, buffer: String },

    #[error("input length mismatch: expected {expected}, got {actual}")]
    InvalidInputLength { expected: usize, actual: usize },
}

pub type CnnResult<T> = Result<T, CnnError>;

impl CnnError {
    pub(crate) fn shape(stage: &str, expected: Shape, actual: Shape) -> Self {
        CnnError::ShapeMismatch {
            stage: stage.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn window(stage: &str, reason: &'static str) -> Self {
        CnnError::InvalidWindow {
            stage: stage.into(),
            reason,
        }
    }
}
