//! Session stage vocabulary and the authoritative status snapshot.
//!
//! `Stage` enumerates the session lifecycle and owns the valid-transition
//! matrix; `SessionStatus` is the full snapshot broadcast to every surface.
//! Snapshots are always complete — receivers never reconstruct state from
//! deltas.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete phase of the dictation session lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No session in progress. Ready to start.
    #[default]
    Idle,
    /// Capturing microphone audio.
    Recording,
    /// Speech-to-text running on the captured audio.
    Transcribing,
    /// Enhancement backend rewriting the transcript. Skipped when
    /// enhancement is disabled and no trigger word fired.
    Enhancing,
    /// Delivering final text into the target application.
    Inserting,
    /// Pipeline finished; result is reusable until the dwell expires.
    Success,
    /// Pipeline failed; the message lives in the status snapshot.
    Error,
    /// Session aborted by the user.
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Stage {
    /// Stable lowercase label used in snapshots, logs, and history entries.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Recording => "recording",
            Stage::Transcribing => "transcribing",
            Stage::Enhancing => "enhancing",
            Stage::Inserting => "inserting",
            Stage::Success => "success",
            Stage::Error => "error",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Whether a session is in flight. Start requests are rejected as busy
    /// while this holds.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Stage::Recording | Stage::Transcribing | Stage::Enhancing | Stage::Inserting
        )
    }

    /// Terminal stages reset to `Idle` after their dwell.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Success | Stage::Error | Stage::Cancelled)
    }

    /// Returns whether a transition from `self` to `target` is valid.
    ///
    /// Exactly one stage is current at any time; the pipeline advances
    /// strictly forward, with `Cancelled` and `Error` reachable from any
    /// in-flight stage. Terminal stages reset to `Idle` or start a new
    /// recording directly.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (Idle, Recording)
                | (Recording, Transcribing)
                | (Transcribing, Enhancing)
                | (Transcribing, Inserting)
                | (Enhancing, Inserting)
                | (Inserting, Success)
                | (Recording, Cancelled)
                | (Transcribing, Cancelled)
                | (Enhancing, Cancelled)
                | (Inserting, Cancelled)
                | (Recording, Error)
                | (Transcribing, Error)
                | (Enhancing, Error)
                | (Inserting, Error)
                | (Success, Idle)
                | (Error, Idle)
                | (Cancelled, Idle)
                | (Success, Recording)
                | (Error, Recording)
                | (Cancelled, Recording)
        )
    }
}

/// The authoritative session record, published as a whole on every change.
///
/// Exactly one logical instance exists per process; it is mutated only by
/// the session controller. Surfaces receive it via push broadcast or pull
/// it synchronously — both read the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub stage: Stage,
    pub stage_label: String,
    pub is_recording: bool,
    /// Milliseconds since the current stage was entered.
    pub elapsed_ms: Option<u64>,
    pub error: Option<String>,
    /// Display name of the scenario profile frozen for this session.
    pub active_profile: Option<String>,
    pub last_text_preview: Option<String>,
    pub last_text_available: bool,
}

impl SessionStatus {
    /// The snapshot every surface starts from.
    pub fn idle() -> Self {
        Self {
            stage: Stage::Idle,
            stage_label: Stage::Idle.label().to_string(),
            is_recording: false,
            elapsed_ms: None,
            error: None,
            active_profile: None,
            last_text_preview: None,
            last_text_available: false,
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Truncate text for display in a status snapshot.
pub fn preview_text(text: &str) -> String {
    const MAX_CHARS: usize = 120;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().take(MAX_CHARS).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::Idle.label(), "idle");
        assert_eq!(Stage::Recording.label(), "recording");
        assert_eq!(Stage::Transcribing.label(), "transcribing");
        assert_eq!(Stage::Enhancing.label(), "enhancing");
        assert_eq!(Stage::Inserting.label(), "inserting");
        assert_eq!(Stage::Success.label(), "success");
        assert_eq!(Stage::Error.label(), "error");
        assert_eq!(Stage::Cancelled.label(), "cancelled");
    }

    #[test]
    fn test_forward_path_transitions() {
        assert!(Stage::Idle.can_transition_to(Stage::Recording));
        assert!(Stage::Recording.can_transition_to(Stage::Transcribing));
        assert!(Stage::Transcribing.can_transition_to(Stage::Enhancing));
        assert!(Stage::Enhancing.can_transition_to(Stage::Inserting));
        assert!(Stage::Inserting.can_transition_to(Stage::Success));
        assert!(Stage::Success.can_transition_to(Stage::Idle));
    }

    #[test]
    fn test_enhancement_skip_transition() {
        assert!(Stage::Transcribing.can_transition_to(Stage::Inserting));
    }

    #[test]
    fn test_cancel_and_error_reachable_from_active_stages() {
        for stage in [
            Stage::Recording,
            Stage::Transcribing,
            Stage::Enhancing,
            Stage::Inserting,
        ] {
            assert!(stage.can_transition_to(Stage::Cancelled), "{stage}");
            assert!(stage.can_transition_to(Stage::Error), "{stage}");
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Stage::Idle.can_transition_to(Stage::Transcribing));
        assert!(!Stage::Idle.can_transition_to(Stage::Success));
        assert!(!Stage::Inserting.can_transition_to(Stage::Enhancing));
        assert!(!Stage::Success.can_transition_to(Stage::Error));
        assert!(!Stage::Idle.can_transition_to(Stage::Idle));
        assert!(!Stage::Recording.can_transition_to(Stage::Recording));
    }

    #[test]
    fn test_terminal_stages_can_start_new_recording() {
        assert!(Stage::Success.can_transition_to(Stage::Recording));
        assert!(Stage::Error.can_transition_to(Stage::Recording));
        assert!(Stage::Cancelled.can_transition_to(Stage::Recording));
    }

    #[test]
    fn test_active_and_terminal_classification() {
        assert!(Stage::Recording.is_active());
        assert!(Stage::Inserting.is_active());
        assert!(!Stage::Idle.is_active());
        assert!(!Stage::Success.is_active());
        assert!(Stage::Error.is_terminal());
        assert!(!Stage::Transcribing.is_terminal());
    }

    #[test]
    fn test_idle_snapshot() {
        let status = SessionStatus::idle();
        assert_eq!(status.stage, Stage::Idle);
        assert_eq!(status.stage_label, "idle");
        assert!(!status.is_recording);
        assert!(!status.last_text_available);
    }

    #[test]
    fn test_status_serialization_round_trip() {
        let mut status = SessionStatus::idle();
        status.stage = Stage::Enhancing;
        status.stage_label = Stage::Enhancing.label().to_string();
        status.elapsed_ms = Some(420);
        status.active_profile = Some("Terminal".to_string());

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"enhancing\""));
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_preview_text_short_passthrough() {
        assert_eq!(preview_text("  hello  "), "hello");
    }

    #[test]
    fn test_preview_text_truncates_long_input() {
        let long = "x".repeat(300);
        let preview = preview_text(&long);
        assert_eq!(preview.chars().count(), 121);
        assert!(preview.ends_with('…'));
    }
}
