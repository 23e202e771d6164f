//! Unified error type for tracker and session operations. Everything the
//! engine can fail with is represented here so callers never see a swallowed
//! failure.

use thiserror::Error;

use crate::store::{StoreError, entities::TrackerId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Tracker {0} does not exist")]
    TrackerNotFound(TrackerId),

    #[error("Tracker {0} has no running session")]
    NoActiveSession(TrackerId),

    #[error("Tracker {0} already has a running session")]
    AlreadyRunning(TrackerId),

    #[error("Tracker {0} is archived")]
    Archived(TrackerId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Broad failure classes, for callers that decide between rejecting input,
/// reporting a missing resource, refusing a conflicting command, or retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Io,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Validation(_) => ErrorClass::Validation,
            EngineError::TrackerNotFound(_) | EngineError::NoActiveSession(_) => {
                ErrorClass::NotFound
            }
            EngineError::AlreadyRunning(_) | EngineError::Archived(_) => ErrorClass::Conflict,
            EngineError::Store(_) => ErrorClass::Io,
        }
    }

    /// True when the failure came from the I/O layer and the store itself is
    /// intact, so a caller may retry a bounded number of times.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::Io(_)))
    }

    pub(crate) fn validation(message: impl Into<String>) -> EngineError {
        EngineError::Validation(message.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_cover_the_taxonomy() {
        assert_eq!(
            EngineError::validation("bad").class(),
            ErrorClass::Validation
        );
        assert_eq!(
            EngineError::TrackerNotFound(TrackerId(1)).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            EngineError::AlreadyRunning(TrackerId(1)).class(),
            ErrorClass::Conflict
        );
        let io = EngineError::Store(StoreError::Io(std::io::Error::other("disk gone")));
        assert_eq!(io.class(), ErrorClass::Io);
        assert!(io.is_transient());
        assert!(!EngineError::Archived(TrackerId(1)).is_transient());
    }
}
