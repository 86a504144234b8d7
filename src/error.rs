use image::ImageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    /// Malformed request parameters. Rejects the whole call.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = DedupError> = std::result::Result<T, E>;

impl DedupError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ItemErrorKind {
        match self {
            Self::Validation(_) => ItemErrorKind::Validation,
            Self::Decode(_) => ItemErrorKind::Decode,
            Self::UnsupportedFormat(_) => ItemErrorKind::UnsupportedFormat,
            Self::Io(_) => ItemErrorKind::Io,
        }
    }
}

impl From<ImageError> for DedupError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Unsupported(e) => Self::UnsupportedFormat(e.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    Validation,
    Decode,
    UnsupportedFormat,
    Io,
}

/// One image in a batch that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub identifier: String,
    pub kind: ItemErrorKind,
    pub error: String,
}

impl ItemError {
    pub fn new(identifier: impl Into<String>, err: &DedupError) -> Self {
        Self {
            identifier: identifier.into(),
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

/// Split per-item outcomes into successes and an error list, keeping input order.
pub fn partition_outcomes<T>(
    outcomes: Vec<(String, Result<T>)>,
) -> (Vec<(String, T)>, Vec<ItemError>) {
    let mut ok = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();

    for (identifier, outcome) in outcomes {
        match outcome {
            Ok(value) => ok.push((identifier, value)),
            Err(e) => {
                log::warn!("Skipping {}: {}", identifier, e);
                errors.push(ItemError::new(identifier, &e));
            }
        }
    }

    (ok, errors)
}
