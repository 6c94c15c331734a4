//! Service-level error taxonomy.
//!
//! Categories map one-to-one onto wire `error` replies. None of these may
//! crash the process; sessions catch them at the message-handler boundary.

use thiserror::Error;

use crate::engine::genome::GenomeStoreError;
use crate::engine::RenderError;

/// Everything that can go wrong while serving one render request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing request fields. Rejected before admission;
    /// no job is created.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced genome does not exist in the configured store.
    /// Rejected before admission.
    #[error("genome not found: {0}")]
    NotFound(String),

    /// The external render function failed or panicked.
    #[error("render failed: {0}")]
    RenderFailure(String),

    /// The job exceeded its wall-clock budget after admission to Running.
    #[error("render timed out after {0} seconds")]
    Timeout(u64),

    /// The client disconnected. Never reported on the wire.
    #[error("cancelled by client disconnect")]
    Cancelled,

    /// Admission queue is at capacity.
    #[error("server busy: admission queue is full")]
    QueueFull,

    /// Connection-level failure; ends the session.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<GenomeStoreError> for ServiceError {
    fn from(err: GenomeStoreError) -> Self {
        match err {
            GenomeStoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<RenderError> for ServiceError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Aborted => ServiceError::Cancelled,
            other => ServiceError::RenderFailure(other.to_string()),
        }
    }
}
