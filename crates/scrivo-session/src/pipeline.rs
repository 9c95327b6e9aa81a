//! Boundary traits for the external pipeline collaborators.
//!
//! Audio capture, speech-to-text, enhancement, text insertion, and
//! foreground probing all live outside the session core. Each is reached
//! through a narrow async trait with a typed error; mock implementations
//! ship alongside for tests and for the composition root before real
//! backends are wired in.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scrivo_core::error::ScrivoError;
use scrivo_core::types::{ForegroundApp, InsertMode};

/// Mono PCM captured from the microphone, resampled at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInput {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

/// Raw speech-to-text result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Enhancement backend result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancedText {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Ambient context sampled when a session starts; individual fields are
/// fed to the enhancer only when the effective toggles allow them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub clipboard: Option<String>,
    pub selected_text: Option<String>,
    pub window_context: Option<String>,
    pub custom_vocabulary: Option<String>,
}

/// Everything an enhancement backend needs for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceRequest {
    pub base_url: String,
    pub model: String,
    pub prompt_text: String,
    pub transcript: String,
    pub context: ContextSnapshot,
}

/// Typed failure of one pipeline stage. Surfaces as the session's `Error`
/// stage with an actionable message; any text already produced is written
/// to history first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("microphone unavailable: {0}")]
    MicUnavailable(String),

    #[error("provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("insertion blocked: {0}")]
    InsertionBlocked(String),

    #[error("{0}")]
    Provider(String),
}

impl StageError {
    /// Short, actionable message for the overlay. Details stay in logs.
    pub fn user_message(&self) -> String {
        match self {
            StageError::MicUnavailable(_) => {
                "No microphone detected. Check the device and select it in settings.".to_string()
            }
            StageError::AuthFailed(_) => {
                "The provider rejected the credentials. Update the API key in settings.".to_string()
            }
            StageError::Network(_) => {
                "Network failure while contacting the provider. Check connectivity.".to_string()
            }
            StageError::InsertionBlocked(_) => {
                "Could not insert into the target application. The text was saved to history."
                    .to_string()
            }
            StageError::Provider(msg) => msg.clone(),
        }
    }
}

impl From<StageError> for ScrivoError {
    fn from(err: StageError) -> Self {
        match &err {
            StageError::MicUnavailable(_) => ScrivoError::Audio(err.to_string()),
            StageError::InsertionBlocked(_) => ScrivoError::Insertion(err.to_string()),
            StageError::AuthFailed(_) | StageError::Network(_) | StageError::Provider(_) => {
                ScrivoError::Transcription(err.to_string())
            }
        }
    }
}

/// Cooperative cancellation flag checked at stage boundaries. It cannot
/// stop a provider call already in flight, only discard its result.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Callback fed raw capture chunks for the level meter.
pub type ChunkCallback = Box<dyn Fn(&[f32]) + Send + Sync>;

/// Microphone capture boundary.
pub trait AudioSource: Send + Sync {
    /// Open the device and start capturing. `on_chunk` is invoked from the
    /// capture path and must be fast.
    fn start(
        &self,
        on_chunk: ChunkCallback,
    ) -> impl Future<Output = Result<(), StageError>> + Send;

    /// Stop capturing and return everything recorded since `start`.
    fn stop(&self) -> impl Future<Output = Result<AudioInput, StageError>> + Send;

    /// Stop capturing and discard the audio.
    fn cancel(&self) -> impl Future<Output = Result<(), StageError>> + Send;
}

/// Speech-to-text boundary.
pub trait SpeechToText: Send + Sync {
    fn transcribe(
        &self,
        audio: AudioInput,
        provider: &str,
        model: &str,
        language: &str,
    ) -> impl Future<Output = Result<Transcript, StageError>> + Send;
}

/// Text-enhancement boundary.
pub trait Enhancer: Send + Sync {
    fn enhance(
        &self,
        request: EnhanceRequest,
    ) -> impl Future<Output = Result<EnhancedText, StageError>> + Send;
}

/// Native text-insertion boundary.
pub trait TextInserter: Send + Sync {
    fn insert(
        &self,
        text: &str,
        mode: InsertMode,
    ) -> impl Future<Output = Result<(), StageError>> + Send;
}

/// Foreground application probing boundary. Used for live profile matching
/// and for the profile editor's "pick window" helper.
pub trait ForegroundProbe: Send + Sync {
    fn foreground_app(&self) -> impl Future<Output = Result<ForegroundApp, StageError>> + Send;

    fn snapshot_context(&self) -> impl Future<Output = Result<ContextSnapshot, StageError>> + Send;
}

// =============================================================================
// Mock implementations
// =============================================================================

/// Deterministic audio source for tests and the default composition root.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    samples: Vec<f32>,
    sample_rate_hz: u32,
    fail_start: bool,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self::with_samples(vec![0.1; 1600], 16_000)
    }

    pub fn with_samples(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
            fail_start: false,
        }
    }

    /// A source whose device cannot be opened.
    pub fn failing() -> Self {
        Self {
            samples: Vec::new(),
            sample_rate_hz: 16_000,
            fail_start: true,
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    async fn start(&self, on_chunk: ChunkCallback) -> Result<(), StageError> {
        if self.fail_start {
            return Err(StageError::MicUnavailable("no input device".to_string()));
        }
        on_chunk(&self.samples);
        Ok(())
    }

    async fn stop(&self) -> Result<AudioInput, StageError> {
        Ok(AudioInput {
            sample_rate_hz: self.sample_rate_hz,
            samples: self.samples.clone(),
        })
    }

    async fn cancel(&self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Speech-to-text mock returning fixed text (or a fixed error), optionally
/// after a delay so cancellation paths can be exercised.
#[derive(Debug, Clone)]
pub struct MockSpeechToText {
    reply: Result<String, StageError>,
    delay: Duration,
}

impl MockSpeechToText {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(error: StageError) -> Self {
        Self {
            reply: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl SpeechToText for MockSpeechToText {
    async fn transcribe(
        &self,
        _audio: AudioInput,
        provider: &str,
        model: &str,
        _language: &str,
    ) -> Result<Transcript, StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map(|text| Transcript {
            text,
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }
}

/// Enhancer mock that uppercases the transcript (or fails), optionally after
/// a delay.
#[derive(Debug, Clone)]
pub struct MockEnhancer {
    fail: Option<StageError>,
    delay: Duration,
}

impl MockEnhancer {
    pub fn new() -> Self {
        Self {
            fail: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing(error: StageError) -> Self {
        Self {
            fail: Some(error),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for MockEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl Enhancer for MockEnhancer {
    async fn enhance(&self, request: EnhanceRequest) -> Result<EnhancedText, StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.fail {
            return Err(error.clone());
        }
        Ok(EnhancedText {
            text: request.transcript.to_uppercase(),
            provider: "mock".to_string(),
            model: request.model,
        })
    }
}

/// Inserter mock recording every insertion so tests can assert on delivery.
#[derive(Debug, Clone, Default)]
pub struct MockTextInserter {
    insertions: Arc<Mutex<Vec<(String, InsertMode)>>>,
    fail: Option<StageError>,
}

impl MockTextInserter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: StageError) -> Self {
        Self {
            insertions: Arc::new(Mutex::new(Vec::new())),
            fail: Some(error),
        }
    }

    pub fn insertions(&self) -> Vec<(String, InsertMode)> {
        self.insertions
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl TextInserter for MockTextInserter {
    async fn insert(&self, text: &str, mode: InsertMode) -> Result<(), StageError> {
        if let Some(error) = &self.fail {
            return Err(error.clone());
        }
        if let Ok(mut guard) = self.insertions.lock() {
            guard.push((text.to_string(), mode));
        }
        Ok(())
    }
}

/// Probe mock returning a fixed foreground application and context.
#[derive(Debug, Clone, Default)]
pub struct MockForegroundProbe {
    app: ForegroundApp,
    context: ContextSnapshot,
}

impl MockForegroundProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app: ForegroundApp) -> Self {
        self.app = app;
        self
    }

    pub fn with_context(mut self, context: ContextSnapshot) -> Self {
        self.context = context;
        self
    }
}

impl ForegroundProbe for MockForegroundProbe {
    async fn foreground_app(&self) -> Result<ForegroundApp, StageError> {
        Ok(self.app.clone())
    }

    async fn snapshot_context(&self) -> Result<ContextSnapshot, StageError> {
        Ok(self.context.clone())
    }
}
