use std::io;

use odiag_remote::{ObjectId, RemoteError, ThreadId};
use thiserror::Error;

pub type Result<T, E = ExploreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("thread {0} has no stack frames")]
    NoFrame(ThreadId),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors that abort one snapshot. Nothing partial is published.
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("remote access failed: {0}")]
    RemoteAccess(#[from] RemoteError),
    #[error("root capture failed: {0}")]
    CaptureFailed(#[from] CaptureError),
    #[error("snapshot was cancelled")]
    Cancelled,
    #[error("child request for object {0} was dropped before its final batch")]
    Abandoned(ObjectId),
}

/// Why [`crate::SnapshotController`] did not publish a diagram.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Explore(#[from] ExploreError),
    #[error("failed to publish diagram: {0}")]
    Publish(#[source] io::Error),
}

impl SnapshotError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Explore(ExploreError::Cancelled))
    }
}
