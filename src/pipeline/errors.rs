use thiserror::Error;

use super::types::Stage;

/// Failures raised by registry operations and the promotion watcher.
///
/// None of these are fatal: every variant leaves the registry exactly as it
/// was before the offending call, so the caller can correct the input and
/// retry the action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Record {id} already exists in stage {stage}")]
    DuplicateId { id: String, stage: Stage },

    #[error("Record {id} not found in stage {stage}")]
    NotFound { id: String, stage: Stage },

    #[error("Move {from} -> {to} rejected, missing from {from}: {missing:?}")]
    Transition {
        from: Stage,
        to: Stage,
        missing: Vec<String>,
    },
}

/// Reported no-op conditions from the command history.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
}
