use thiserror::Error;

use scrivo_core::error::ScrivoError;
use scrivo_core::status::SessionStatus;

/// Failure of the pull path only. Sync errors never reach the session
/// pipeline; they affect the observing surface's health state and nothing
/// else.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("status source unavailable: {0}")]
    Unavailable(String),

    #[error("status query timed out")]
    Timeout,
}

impl From<SyncError> for ScrivoError {
    fn from(err: SyncError) -> Self {
        ScrivoError::Sync(err.to_string())
    }
}

/// Synchronous pull access to the authoritative session status.
///
/// Implementors must answer from the same state the push broadcast reads;
/// a cached copy that can drift from the push channel violates the
/// protocol. The in-process session controller implements this directly;
/// an IPC bridge would implement it with a fallible round trip.
pub trait StatusSource: Send + Sync {
    fn snapshot(&self) -> Result<SessionStatus, SyncError>;
}
