// ==============================================================================
// error.rs - Pipeline Error Types
// ==============================================================================
// Description: Error enum shared by every pipeline stage
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingConfiguration(Vec<String>),

    #[error("Database error: {0}")]
    DataAccess(#[from] sqlx::Error),

    #[error("External procedure '{program}' could not be started")]
    ProcedureNotFound { program: String },

    #[error("External procedure exited with {status}: {stderr}")]
    ProcedureFailed {
        status: String,
        stderr: String,
        stdout: String,
    },

    #[error("External procedure did not produce {path:?}")]
    MissingOutput { path: PathBuf },

    #[error("Relabeling is only defined for clusters 1..=6, found {found:?}")]
    UndefinedRelabeling { found: Vec<u32> },

    #[error("Invalid feature value {value} in column {column} for admission {hadm_id}")]
    InvalidFeature {
        hadm_id: i32,
        column: String,
        value: i64,
    },

    #[error("Subgroup column {0} not found in assignments file")]
    MissingSubgroupColumn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_lists_every_key() {
        let err = PipelineError::MissingConfiguration(vec![
            "DATABASE_URL".to_string(),
            "TARGET_PATIENT".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required configuration: DATABASE_URL, TARGET_PATIENT"
        );
    }

    #[test]
    fn test_undefined_relabeling_message() {
        let err = PipelineError::UndefinedRelabeling { found: vec![1, 2, 3] };
        assert!(err.to_string().contains("[1, 2, 3]"));
    }
}
