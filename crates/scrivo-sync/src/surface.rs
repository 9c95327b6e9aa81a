//! Surface-side status monitor.
//!
//! Each UI surface (overlay, tray, main window) attaches one monitor. The
//! monitor pulls once immediately, then listens for pushes; whenever pushes
//! stay silent past the configured grace it polls the status query. Polling
//! that keeps failing — or that never observes a push or a non-idle stage —
//! exhausts the retry budget and degrades the surface to `Unavailable`,
//! which renderers must show instead of a frozen idle view. Any later push
//! or live poll revives it.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use scrivo_core::status::{SessionStatus, Stage};

use crate::hub::StatusHub;
use crate::source::StatusSource;

/// Timing contract of the fallback path. These are configuration, not
/// call-site constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// How long after attach (or the last push) to wait before polling.
    pub attach_grace: Duration,
    /// Interval between fallback polls.
    pub poll_interval: Duration,
    /// Polls without evidence of liveness before the surface degrades.
    pub max_poll_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            attach_grace: Duration::from_millis(500),
            poll_interval: Duration::from_millis(250),
            max_poll_attempts: 20,
        }
    }
}

/// How the surface is currently kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceHealth {
    /// Receiving pushes.
    Live,
    /// Converging via the pull query.
    Polling,
    /// Retry budget exhausted; renderers must show "sync unavailable".
    Unavailable,
}

impl fmt::Display for SurfaceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceHealth::Live => write!(f, "live"),
            SurfaceHealth::Polling => write!(f, "polling"),
            SurfaceHealth::Unavailable => write!(f, "sync unavailable"),
        }
    }
}

#[derive(Debug, Clone)]
struct View {
    health: SurfaceHealth,
    status: Option<SessionStatus>,
}

/// Handle to a running surface monitor.
pub struct SurfaceHandle {
    name: String,
    view: Arc<Mutex<View>>,
    task: JoinHandle<()>,
}

impl SurfaceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> SurfaceHealth {
        self.view.lock().map(|v| v.health).unwrap_or(SurfaceHealth::Unavailable)
    }

    /// Last snapshot this surface converged on, if any.
    pub fn status(&self) -> Option<SessionStatus> {
        self.view.lock().ok().and_then(|v| v.status.clone())
    }

    /// Stop the monitor task.
    pub fn detach(&self) {
        self.task.abort();
    }
}

/// Attach a surface to the hub and start its monitor task.
pub fn attach_surface<S>(
    name: impl Into<String>,
    hub: &StatusHub,
    source: Arc<S>,
    config: SyncConfig,
) -> SurfaceHandle
where
    S: StatusSource + 'static,
{
    let name = name.into();
    let view = Arc::new(Mutex::new(View {
        health: SurfaceHealth::Polling,
        status: None,
    }));

    let task = tokio::spawn(monitor_loop(
        name.clone(),
        hub.subscribe_status(),
        source,
        config,
        view.clone(),
    ));

    SurfaceHandle { name, view, task }
}

async fn monitor_loop<S>(
    name: String,
    mut rx: tokio::sync::broadcast::Receiver<crate::hub::StatusFrame>,
    source: Arc<S>,
    config: SyncConfig,
    view: Arc<Mutex<View>>,
) where
    S: StatusSource,
{
    // Polls that produced no evidence the other side is alive. A push or a
    // non-idle snapshot is that evidence.
    let mut stale_polls: u32 = 0;
    let mut converged = false;

    // Pull once right away so a late attach does not sit at idle waiting
    // for the next push.
    poll_once(
        &name,
        source.as_ref(),
        &view,
        &config,
        &mut stale_polls,
        &mut converged,
    );

    let mut wait = config.attach_grace;
    let mut pushes_open = true;

    loop {
        if pushes_open {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Ok(frame) => {
                        converged = true;
                        stale_polls = 0;
                        set_view(&view, SurfaceHealth::Live, Some(frame.status));
                        wait = config.attach_grace;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Every frame is a full snapshot, so skipping ahead
                        // loses nothing.
                        tracing::debug!(surface = %name, skipped, "status frames coalesced");
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!(surface = %name, "push channel closed, poll-only from here");
                        pushes_open = false;
                    }
                },
                _ = tokio::time::sleep(wait) => {
                    poll_once(&name, source.as_ref(), &view, &config, &mut stale_polls, &mut converged);
                    wait = config.poll_interval;
                }
            }
        } else {
            tokio::time::sleep(wait).await;
            poll_once(
                &name,
                source.as_ref(),
                &view,
                &config,
                &mut stale_polls,
                &mut converged,
            );
            wait = config.poll_interval;
        }
    }
}

fn poll_once<S>(
    name: &str,
    source: &S,
    view: &Arc<Mutex<View>>,
    config: &SyncConfig,
    stale_polls: &mut u32,
    converged: &mut bool,
) where
    S: StatusSource + ?Sized,
{
    match source.snapshot() {
        Ok(status) => {
            let live = status.stage != Stage::Idle;
            if live {
                *converged = true;
                *stale_polls = 0;
            } else if !*converged {
                *stale_polls += 1;
            }

            let health = if !live && degraded(*stale_polls, config) {
                SurfaceHealth::Unavailable
            } else {
                SurfaceHealth::Polling
            };
            set_view(view, health, Some(status));
        }
        Err(e) => {
            *stale_polls += 1;
            tracing::warn!(surface = %name, error = %e, "status poll failed");
            if degraded(*stale_polls, config) {
                set_view(view, SurfaceHealth::Unavailable, None);
            }
        }
    }
}

fn degraded(stale_polls: u32, config: &SyncConfig) -> bool {
    stale_polls >= config.max_poll_attempts
}

fn set_view(view: &Arc<Mutex<View>>, health: SurfaceHealth, status: Option<SessionStatus>) {
    if let Ok(mut v) = view.lock() {
        v.health = health;
        if let Some(status) = status {
            v.status = Some(status);
        }
    }
}
