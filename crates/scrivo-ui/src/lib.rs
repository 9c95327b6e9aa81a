//! Scrivo UI crate - view-models for the feedback surfaces.
//!
//! The tray and overlay renderers are platform shells; everything they show
//! is derived here from the synced `SessionStatus` and the surface health.
//! Keeping the mapping pure makes the surfaces trivially testable and keeps
//! rendering concerns out of the session core.

pub mod overlay;
pub mod tray;

pub use overlay::{overlay_model, OverlayModel};
pub use tray::{TrayMenuAction, TrayModel, TrayState};
