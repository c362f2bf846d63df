//! Orchestrator error types.
//!
//! These cover admission and bookkeeping failures. Deployment-level
//! failures are not errors at this boundary: every collaborator error is
//! caught by the state machine, mapped onto the record's
//! [`FailureKind`](switchyard_core::FailureKind) taxonomy, and reported as
//! a terminal outcome. No raw collaborator error crosses into
//! deployment-record state.

use thiserror::Error;

use switchyard_state::StateError;

/// Result type alias for orchestrator operations.
pub type OrchestrateResult<T> = Result<T, OrchestrateError>;

/// Errors that can occur while admitting or querying deployments.
#[derive(Debug, Error)]
pub enum OrchestrateError {
    /// A deployment for this key is already in a non-terminal state.
    #[error("deployment already in progress for {0}")]
    KeyBusy(String),

    #[error("attempt not found: {0}")]
    AttemptNotFound(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}
