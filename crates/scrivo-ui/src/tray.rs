//! Tray icon state and context menu mapping.
//!
//! The icon color reflects the session:
//! - Grey: idle
//! - Orange: recording
//! - Blue: pipeline busy (transcribing / enhancing / inserting)
//! - Red: error

use scrivo_core::status::{SessionStatus, Stage};
use scrivo_sync::surface::SurfaceHealth;

/// Visual state of the tray icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayState {
    Idle,
    Recording,
    Busy,
    Error,
}

impl std::fmt::Display for TrayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrayState::Idle => write!(f, "Idle"),
            TrayState::Recording => write!(f, "Recording"),
            TrayState::Busy => write!(f, "Busy"),
            TrayState::Error => write!(f, "Error"),
        }
    }
}

/// Action behind each context menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayMenuAction {
    ToggleDictation,
    CancelSession,
    CopyLastResult,
    OpenHistory,
    OpenSettings,
    Quit,
}

/// Everything a tray renderer needs for one repaint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayModel {
    pub state: TrayState,
    pub tooltip: String,
    pub cancel_enabled: bool,
    pub copy_last_enabled: bool,
}

impl TrayModel {
    /// Derive the tray view from the surface's last synced snapshot.
    pub fn from_surface(health: SurfaceHealth, status: Option<&SessionStatus>) -> Self {
        let Some(status) = status else {
            return Self {
                state: TrayState::Idle,
                tooltip: tooltip_for(health, None),
                cancel_enabled: false,
                copy_last_enabled: false,
            };
        };

        let state = match status.stage {
            Stage::Recording => TrayState::Recording,
            Stage::Transcribing | Stage::Enhancing | Stage::Inserting => TrayState::Busy,
            Stage::Error => TrayState::Error,
            Stage::Idle | Stage::Success | Stage::Cancelled => TrayState::Idle,
        };

        Self {
            state,
            tooltip: tooltip_for(health, Some(status)),
            cancel_enabled: status.stage.is_active(),
            copy_last_enabled: status.last_text_available,
        }
    }
}

fn tooltip_for(health: SurfaceHealth, status: Option<&SessionStatus>) -> String {
    if health == SurfaceHealth::Unavailable {
        return "Scrivo - sync unavailable".to_string();
    }
    match status {
        Some(status) => match &status.error {
            Some(error) => format!("Scrivo - {}: {}", status.stage_label, error),
            None => format!("Scrivo - {}", status.stage_label),
        },
        None => "Scrivo - connecting".to_string(),
    }
}
