use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Debug, Error)]
pub enum TwinError {
    #[error("config file not found at {0}")]
    ConfigMissing(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no sensor data available for window starting at {start}")]
    InsufficientData { start: i64 },

    #[error("model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("realized and predicted lengths differ for [{start}, {stop}]: {realized} vs {predicted}")]
    LengthMismatch {
        start: i64,
        stop: i64,
        realized: usize,
        predicted: usize,
    },

    #[error("schedule ledger at {path} is corrupt: {reason}")]
    ScheduleCorrupt { path: PathBuf, reason: String },

    #[error("records already present in {table} for timestamps starting at {start}")]
    DuplicateRecords { table: String, start: i64 },

    #[error("model error: {0}")]
    Model(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<TwinError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl TwinError {
    /// Attach the pipeline stage that produced this error.
    pub fn in_stage(self, stage: Stage) -> Self {
        TwinError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The underlying error with any stage wrappers removed.
    pub fn root_cause(&self) -> &TwinError {
        match self {
            TwinError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            TwinError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TwinError>;
