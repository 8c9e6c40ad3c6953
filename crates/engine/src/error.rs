//! Error taxonomy for labeling and dataset assembly

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelError {
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Empty input: no prices to label")]
    EmptyInput,

    #[error("Malformed series at index {index}: {reason}")]
    MalformedSeries { index: usize, reason: String },
}

impl LabelError {
    pub(crate) fn invalid(name: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }

    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedSeries {
            index,
            reason: reason.into(),
        }
    }
}

pub type LabelResult<T> = Result<T, LabelError>;
