//! Errors of the ingest service.

use fmv_core::{BufferError, DemuxError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// The stream can no longer be demultiplexed; the session must restart.
    #[error("Stream unreadable: {0}")]
    Demux(#[from] DemuxError),

    #[error("Sidecar serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
