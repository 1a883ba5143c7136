//! Error taxonomy for the confounding pipeline.
//!
//! Public functions return `anyhow::Result`. The fatal categories below are carried inside the
//! `anyhow::Error` so callers can inspect them with `downcast_ref::<PipelineError>()`.
//! Degenerate statistics are normally recovered in place (undefined cells, failed rows) and only
//! surface as an error when a caller asks for a single statistic directly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The dataset collaborator could not deliver the requested table.
    #[error("dataset '{dataset}' unavailable: {reason}")]
    DataUnavailable { dataset: String, reason: String },

    /// Expected columns are absent from a covariate or expression table, or the sample index
    /// repeats an id.
    #[error("schema mismatch in {context}: missing {}", missing.join(", "))]
    SchemaMismatch {
        context: String,
        missing: Vec<String>,
    },

    #[error("degenerate statistic in {context}")]
    DegenerateStatistic { context: String },

    #[error("fit failed for gene {gene}: {reason}")]
    WorkerFailure { gene: String, reason: String },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl PipelineError {
    pub fn schema(context: impl Into<String>, missing: Vec<String>) -> Self {
        PipelineError::SchemaMismatch {
            context: context.into(),
            missing,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// True for the categories that abort a pipeline run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::DataUnavailable { .. } | PipelineError::SchemaMismatch { .. }
        )
    }
}
