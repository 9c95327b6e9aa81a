//! Scrivo core crate - configuration, scenario profiles, trigger words, and
//! the session status vocabulary shared by every surface.
//!
//! Everything in this crate is pure domain logic: no I/O except the config
//! store, no async, no platform bindings. The session controller and the
//! sync hub build on these types.

pub mod config;
pub mod error;
pub mod profile;
pub mod status;
pub mod text;
pub mod trigger;
pub mod types;

pub use config::{AppConfig, ConfigStore, ContextToggles, GlobalDefaults, PromptTemplate};
pub use error::{Result, ScrivoError};
pub use profile::{
    resolve_effective_config, EffectiveConfig, EphemeralOverrides, MatchRule, OverrideSet,
    ScenarioProfile,
};
pub use status::{preview_text, SessionStatus, Stage};
pub use text::{scrub_enhancement, scrub_transcript};
pub use trigger::{apply_trigger_words, TriggerDecision};
pub use types::{ForegroundApp, InsertMode, ProfileId, PromptId};
