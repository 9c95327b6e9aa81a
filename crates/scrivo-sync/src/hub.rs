use serde::Serialize;
use tokio::sync::broadcast;

use scrivo_core::status::SessionStatus;

/// Stable topic name for session status snapshots.
pub const SESSION_STATUS_TOPIC: &str = "session/status";

/// Stable topic name for microphone level samples.
pub const MIC_LEVEL_TOPIC: &str = "session/mic-level";

/// One push: always the full snapshot, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusFrame {
    pub topic: &'static str,
    pub status: SessionStatus,
}

/// Microphone level sample, emitted only while recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MicLevelFrame {
    pub topic: &'static str,
    pub rms: f32,
    pub peak: f32,
}

/// Fan-out point for status pushes and mic level samples.
///
/// Any number of surfaces may subscribe at any time; a subscriber that lags
/// simply skips to a newer frame, which is safe because every frame carries
/// the full snapshot.
#[derive(Debug, Clone)]
pub struct StatusHub {
    status_tx: broadcast::Sender<StatusFrame>,
    level_tx: broadcast::Sender<MicLevelFrame>,
}

impl StatusHub {
    const STATUS_CAPACITY: usize = 256;
    const LEVEL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(Self::STATUS_CAPACITY);
        let (level_tx, _) = broadcast::channel(Self::LEVEL_CAPACITY);
        Self {
            status_tx,
            level_tx,
        }
    }

    /// Broadcast a status snapshot. Having no subscribers is not an error.
    pub fn publish_status(&self, status: SessionStatus) {
        let frame = StatusFrame {
            topic: SESSION_STATUS_TOPIC,
            status,
        };
        if self.status_tx.send(frame).is_err() {
            tracing::trace!("status push with no subscribers");
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusFrame> {
        self.status_tx.subscribe()
    }

    /// Broadcast one mic level sample. Values are clamped to [0, 1].
    pub fn publish_level(&self, rms: f32, peak: f32) {
        let frame = MicLevelFrame {
            topic: MIC_LEVEL_TOPIC,
            rms: rms.clamp(0.0, 1.0),
            peak: peak.clamp(0.0, 1.0),
        };
        let _ = self.level_tx.send(frame);
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<MicLevelFrame> {
        self.level_tx.subscribe()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}
