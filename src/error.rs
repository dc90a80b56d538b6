use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the MAGAN model and its checkpoints.
#[derive(Debug, Error)]
pub enum MaganError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("batch for domain {domain} must be 2-D, got shape {shape:?}")]
    BatchRank { domain: &'static str, shape: Vec<i64> },

    #[error("batch for domain {domain} has {actual} columns, expected {expected}")]
    DimensionMismatch {
        domain: &'static str,
        expected: i64,
        actual: i64,
    },

    #[error("batch for domain {0} is empty")]
    EmptyBatch(&'static str),

    #[error("unknown layer name: {0}")]
    UnknownLayer(String),

    #[error("correspondence loss returned shape {actual:?}, expected one value per sample ({expected})")]
    CorrespondenceShape { expected: i64, actual: Vec<i64> },

    #[error("correspondence loss cannot compare width {source_dim} with width {target_dim}: {reason}")]
    CorrespondenceDims {
        source_dim: i64,
        target_dim: i64,
        reason: String,
    },

    #[error("correspondence loss returned non-finite values")]
    NonFiniteCorrespondence,

    #[error("checkpoint not found: {}", .0.display())]
    CheckpointMissing(PathBuf),

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    UnsupportedCheckpoint { found: u32, expected: u32 },

    #[error(
        "checkpoint in {} has {} = {}, model was configured with {}",
        .folder.display(), .field, .found, .configured
    )]
    CheckpointMismatch {
        folder: PathBuf,
        field: &'static str,
        found: i64,
        configured: i64,
    },

    #[error(transparent)]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MaganError>;
