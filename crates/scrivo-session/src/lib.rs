//! Scrivo session crate - the session lifecycle authority.
//!
//! Owns the single process-wide session state: the stage machine, the
//! frozen per-session profile resolution, the abortable pipeline task, and
//! the timing contracts (success dwell, error dwell, recording watchdog).
//! The pipeline stages themselves (speech-to-text, enhancement, insertion,
//! audio capture, foreground probing) are external collaborators reached
//! through the traits in [`pipeline`].

pub mod controller;
pub mod engine;
pub mod pipeline;
pub mod state;

pub use controller::{ControllerTunables, SessionController};
pub use engine::{EngineFailure, EngineRun, PipelineEngine, SessionRecord, SessionTimings};
pub use pipeline::{
    AudioInput, AudioSource, CancelFlag, ContextSnapshot, EnhanceRequest, EnhancedText, Enhancer,
    ForegroundProbe, SpeechToText, StageError, TextInserter, Transcript,
};
pub use state::{advance, SessionError};
