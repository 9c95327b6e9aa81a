//! Scrivo sync crate - status propagation to UI surfaces.
//!
//! Two independent delivery mechanisms converge on one source of truth:
//! a push broadcast of full `SessionStatus` snapshots, and a synchronous
//! pull query. A surface that misses pushes (late attach, dropped events,
//! transient channel trouble) falls back to bounded polling and, past its
//! retry budget, degrades to a visible "sync unavailable" state instead of
//! silently freezing. Microphone levels travel on a separate lower-rate
//! channel that is only live while recording.

pub mod hub;
pub mod level;
pub mod source;
pub mod surface;

pub use hub::{MicLevelFrame, StatusFrame, StatusHub, MIC_LEVEL_TOPIC, SESSION_STATUS_TOPIC};
pub use level::{compute_levels, smooth_level, LevelMeter};
pub use source::{StatusSource, SyncError};
pub use surface::{attach_surface, SurfaceHandle, SurfaceHealth, SyncConfig};
