//! Validated stage transitions for the session lifecycle.
//!
//! The transition matrix itself lives on [`Stage`]; this module enforces it
//! and gives rejection a typed shape. The controller owns the single stage
//! cell and is the only writer.

use thiserror::Error;

use scrivo_core::error::ScrivoError;
use scrivo_core::status::Stage;

/// Rejection of a session control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A start request arrived while a session was in flight. Requests are
    /// rejected, never queued.
    #[error("session already active in stage {0}; start rejected")]
    Busy(Stage),

    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
}

impl From<SessionError> for ScrivoError {
    fn from(err: SessionError) -> Self {
        ScrivoError::Session(err.to_string())
    }
}

/// Move `current` to `target` if the transition matrix allows it.
pub fn advance(current: &mut Stage, target: Stage) -> Result<(), SessionError> {
    if current.can_transition_to(target) {
        tracing::debug!("session stage: {} -> {}", current, target);
        *current = target;
        Ok(())
    } else {
        Err(SessionError::InvalidTransition {
            from: *current,
            to: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_happy_path() {
        let mut stage = Stage::Idle;
        for target in [
            Stage::Recording,
            Stage::Transcribing,
            Stage::Enhancing,
            Stage::Inserting,
            Stage::Success,
            Stage::Idle,
        ] {
            advance(&mut stage, target).unwrap();
            assert_eq!(stage, target);
        }
    }

    #[test]
    fn test_advance_rejects_skips() {
        let mut stage = Stage::Idle;
        let err = advance(&mut stage, Stage::Inserting).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: Stage::Idle,
                to: Stage::Inserting,
            }
        );
        // Rejection leaves the stage untouched.
        assert_eq!(stage, Stage::Idle);
    }

    #[test]
    fn test_cancel_from_any_active_stage() {
        for start in [
            Stage::Recording,
            Stage::Transcribing,
            Stage::Enhancing,
            Stage::Inserting,
        ] {
            let mut stage = start;
            advance(&mut stage, Stage::Cancelled).unwrap();
            assert_eq!(stage, Stage::Cancelled);
        }
    }

    #[test]
    fn test_busy_error_message_names_stage() {
        let err = SessionError::Busy(Stage::Transcribing);
        assert!(err.to_string().contains("transcribing"));
        let top: ScrivoError = err.into();
        assert!(matches!(top, ScrivoError::Session(_)));
    }

    #[test]
    fn test_transition_error_names_both_stages() {
        let mut stage = Stage::Success;
        let err = advance(&mut stage, Stage::Error).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("success"));
        assert!(msg.contains("error"));
    }
}
