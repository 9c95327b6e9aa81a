//! Always-on-top overlay view-model.
//!
//! The overlay is visible whenever a session is in flight or has just
//! finished (the terminal dwell keeps the outcome readable), and it must
//! show the degraded-sync indication instead of freezing at a stale stage.

use scrivo_core::status::{SessionStatus, Stage};
use scrivo_sync::surface::SurfaceHealth;

/// One overlay repaint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayModel {
    pub visible: bool,
    pub headline: String,
    pub detail: Option<String>,
    pub show_level_meter: bool,
    pub show_sync_warning: bool,
}

/// Derive the overlay view from the surface's last synced snapshot.
pub fn overlay_model(health: SurfaceHealth, status: Option<&SessionStatus>) -> OverlayModel {
    let sync_lost = health == SurfaceHealth::Unavailable;

    let Some(status) = status else {
        return OverlayModel {
            visible: sync_lost,
            headline: if sync_lost {
                "sync unavailable".to_string()
            } else {
                String::new()
            },
            detail: None,
            show_level_meter: false,
            show_sync_warning: sync_lost,
        };
    };

    let headline = if sync_lost {
        "sync unavailable".to_string()
    } else {
        status.stage_label.clone()
    };

    OverlayModel {
        visible: status.stage != Stage::Idle || sync_lost,
        headline,
        detail: status.error.clone().or_else(|| {
            (status.stage == Stage::Success)
                .then(|| status.last_text_preview.clone())
                .flatten()
        }),
        show_level_meter: status.is_recording && !sync_lost,
        show_sync_warning: sync_lost,
    }
}
