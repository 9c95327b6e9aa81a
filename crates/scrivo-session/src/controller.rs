//! The session controller: single writer of the authoritative status.
//!
//! Owns the stage cell, the per-session frozen profile resolution, the
//! background pipeline task, and every timing contract (success dwell,
//! error dwell, recording watchdog). Surfaces observe it through the status
//! hub (push) or the `StatusSource` impl (pull) and never mutate anything.
//!
//! A monotonically increasing session epoch guards all deferred work:
//! stale pipeline completions, watchdogs, and dwell timers from an earlier
//! or cancelled session can never touch a newer one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use scrivo_core::config::AppConfig;
use scrivo_core::error::{Result, ScrivoError};
use scrivo_core::profile::{resolve_effective_config, EffectiveConfig, EphemeralOverrides};
use scrivo_core::status::{preview_text, SessionStatus, Stage};
use scrivo_core::types::ForegroundApp;
use scrivo_history::{HistoryEntry, HistoryStore};
use scrivo_sync::level::LevelMeter;
use scrivo_sync::source::{StatusSource, SyncError};
use scrivo_sync::StatusHub;

use crate::engine::{EngineRun, PipelineEngine};
use crate::pipeline::{
    AudioSource, CancelFlag, ChunkCallback, Enhancer, ForegroundProbe, SpeechToText, TextInserter,
};
use crate::state::{advance, SessionError};

/// Every time-based contract of the session lifecycle. Configuration, not
/// call-site constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTunables {
    /// How long `Success` stays visible (and the last result stays fresh)
    /// before auto-reset to `Idle`.
    pub success_dwell: Duration,
    /// How long `Error` stays visible before auto-reset to `Idle`.
    pub error_dwell: Duration,
    /// How long `Cancelled` stays visible before auto-reset to `Idle`.
    pub cancel_dwell: Duration,
    /// Recording watchdog: a session still recording after this long is
    /// stopped automatically.
    pub max_recording: Duration,
    /// Minimum spacing between mic level emissions.
    pub level_interval: Duration,
    /// Fewer captured samples than this counts as "no audio".
    pub min_audio_samples: usize,
}

impl Default for ControllerTunables {
    fn default() -> Self {
        Self {
            success_dwell: Duration::from_millis(1500),
            error_dwell: Duration::from_secs(6),
            cancel_dwell: Duration::from_millis(1500),
            max_recording: Duration::from_secs(120),
            level_interval: Duration::from_millis(50),
            min_audio_samples: 160,
        }
    }
}

#[derive(Debug, Clone)]
struct FrozenSession {
    app: ForegroundApp,
    config: EffectiveConfig,
    profile_name: Option<String>,
}

#[derive(Debug)]
struct Inner {
    stage: Stage,
    stage_entered_at: Instant,
    epoch: u64,
    frozen: Option<FrozenSession>,
    last_text: Option<String>,
    error_message: Option<String>,
    cancel: Option<CancelFlag>,
    task: Option<JoinHandle<()>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            stage_entered_at: Instant::now(),
            epoch: 0,
            frozen: None,
            last_text: None,
            error_message: None,
            cancel: None,
            task: None,
        }
    }
}

/// Coordinates one session at a time across the pipeline boundaries.
pub struct SessionController<A, F, S, E, I> {
    audio: Arc<A>,
    probe: Arc<F>,
    engine: Arc<PipelineEngine<S, E, I>>,
    history: Arc<HistoryStore>,
    hub: StatusHub,
    tunables: ControllerTunables,
    config: Arc<Mutex<AppConfig>>,
    inner: Arc<Mutex<Inner>>,
}

impl<A, F, S, E, I> Clone for SessionController<A, F, S, E, I> {
    fn clone(&self) -> Self {
        Self {
            audio: self.audio.clone(),
            probe: self.probe.clone(),
            engine: self.engine.clone(),
            history: self.history.clone(),
            hub: self.hub.clone(),
            tunables: self.tunables,
            config: self.config.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<A, F, S, E, I> SessionController<A, F, S, E, I>
where
    A: AudioSource + 'static,
    F: ForegroundProbe + 'static,
    S: SpeechToText + 'static,
    E: Enhancer + 'static,
    I: TextInserter + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        audio: Arc<A>,
        probe: Arc<F>,
        stt: Arc<S>,
        enhancer: Arc<E>,
        inserter: Arc<I>,
        history: Arc<HistoryStore>,
        hub: StatusHub,
        config: AppConfig,
        tunables: ControllerTunables,
    ) -> Self {
        Self {
            audio,
            probe,
            engine: Arc::new(PipelineEngine::new(stt, enhancer, inserter)),
            history,
            hub,
            tunables,
            config: Arc::new(Mutex::new(config)),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    pub fn config(&self) -> AppConfig {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whole-document config replace; rejected documents leave the current
    /// one in place.
    pub fn replace_config(&self, new: AppConfig) -> Result<()> {
        new.validate()?;
        let mut guard = self
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = new;
        info!("configuration replaced");
        Ok(())
    }

    /// The authoritative snapshot. Push and pull both come through here.
    pub fn status(&self) -> SessionStatus {
        let inner = self.lock_inner();
        SessionStatus {
            stage: inner.stage,
            stage_label: inner.stage.label().to_string(),
            is_recording: inner.stage == Stage::Recording,
            elapsed_ms: (inner.stage != Stage::Idle)
                .then(|| inner.stage_entered_at.elapsed().as_millis() as u64),
            error: inner.error_message.clone(),
            active_profile: inner.frozen.as_ref().and_then(|f| f.profile_name.clone()),
            last_text_preview: inner.last_text.as_deref().map(preview_text),
            last_text_available: inner.last_text.as_deref().is_some_and(|t| !t.is_empty()),
        }
    }

    /// Full text of the last successful (or salvaged) result while it is
    /// still fresh.
    pub fn last_text(&self) -> Option<String> {
        self.lock_inner().last_text.clone()
    }

    /// Hotkey entry point: start when idle, stop-and-process when recording,
    /// reject when the pipeline is busy.
    pub async fn toggle(&self) -> Result<SessionStatus> {
        let stage = self.lock_inner().stage;
        match stage {
            Stage::Recording => self.stop_session().await?,
            s if s.is_active() => return Err(SessionError::Busy(s).into()),
            _ => self.start_session().await?,
        }
        Ok(self.status())
    }

    /// Start a session with no per-invocation overrides.
    pub async fn start_session(&self) -> Result<()> {
        self.start_session_with(EphemeralOverrides::default()).await
    }

    /// Start recording. The scenario profile is resolved here and frozen
    /// for the whole session; focus changes while recording change nothing.
    pub async fn start_session_with(&self, ephemeral: EphemeralOverrides) -> Result<()> {
        {
            let inner = self.lock_inner();
            if inner.stage.is_active() {
                return Err(SessionError::Busy(inner.stage).into());
            }
        }

        let app = self.probe.foreground_app().await.unwrap_or_default();
        let frozen = {
            let config = self.config();
            let effective =
                resolve_effective_config(&config.defaults, &config.profiles, &app, &ephemeral);
            let profile_name = effective
                .matched_profile
                .as_ref()
                .and_then(|id| config.profiles.iter().find(|p| &p.id == id))
                .map(|p| p.name.clone());
            FrozenSession {
                app,
                config: effective,
                profile_name,
            }
        };

        let profile_label = frozen.profile_name.clone();
        let epoch = {
            let mut inner = self.lock_inner();
            // The probe call awaited; someone may have started meanwhile.
            if inner.stage.is_active() {
                return Err(SessionError::Busy(inner.stage).into());
            }
            advance(&mut inner.stage, Stage::Recording)?;
            inner.stage_entered_at = Instant::now();
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.frozen = Some(frozen);
            inner.last_text = None;
            inner.error_message = None;
            inner.epoch
        };
        info!(
            profile = profile_label.as_deref().unwrap_or("-"),
            "session started"
        );
        self.publish();

        // Mic level feed: measured in the capture callback, pushed on the
        // level topic, and silenced outside Recording.
        let meter = Arc::new(Mutex::new(LevelMeter::new(self.tunables.level_interval)));
        let hub = self.hub.clone();
        let inner_for_levels = self.inner.clone();
        let on_chunk: ChunkCallback = Box::new(move |chunk| {
            let recording = inner_for_levels
                .lock()
                .map(|i| i.stage == Stage::Recording)
                .unwrap_or(false);
            if !recording {
                return;
            }
            if let Ok(mut meter) = meter.lock() {
                if let Some((rms, peak)) = meter.sample(chunk) {
                    hub.publish_level(rms, peak);
                }
            }
        });

        if let Err(e) = self.audio.start(on_chunk).await {
            warn!(error = %e, "failed to start recording");
            self.fail(epoch, e.user_message());
            return Err(e.into());
        }

        // Watchdog: a forgotten hotkey must not record forever.
        let controller = self.clone();
        let max_recording = self.tunables.max_recording;
        tokio::spawn(async move {
            tokio::time::sleep(max_recording).await;
            let still_recording = {
                let inner = controller.lock_inner();
                inner.epoch == epoch && inner.stage == Stage::Recording
            };
            if still_recording {
                info!("max recording duration reached; stopping session");
                let _ = controller.stop_session().await;
            }
        });

        Ok(())
    }

    /// Stop recording and run the rest of the pipeline in the background so
    /// the control path stays responsive and cancel can abort it.
    pub async fn stop_session(&self) -> Result<()> {
        let epoch = {
            let mut inner = self.lock_inner();
            if inner.stage != Stage::Recording {
                return Err(SessionError::InvalidTransition {
                    from: inner.stage,
                    to: Stage::Transcribing,
                }
                .into());
            }
            advance(&mut inner.stage, Stage::Transcribing)?;
            inner.stage_entered_at = Instant::now();
            inner.epoch
        };
        self.publish();

        let audio = match self.audio.stop().await {
            Ok(audio) => audio,
            Err(e) => {
                self.fail(epoch, e.user_message());
                return Err(e.into());
            }
        };
        if audio.samples.len() < self.tunables.min_audio_samples {
            let message = "no audio captured from the microphone".to_string();
            self.fail(epoch, message.clone());
            return Err(ScrivoError::Audio(message));
        }

        let context = self.probe.snapshot_context().await.unwrap_or_default();

        let Some(frozen) = self.lock_inner().frozen.clone() else {
            let message = "session state lost before processing".to_string();
            self.fail(epoch, message.clone());
            return Err(ScrivoError::Session(message));
        };
        let (prompts, history_enabled) = {
            let config = self.config();
            (config.prompts, config.defaults.history_enabled)
        };

        let cancel = CancelFlag::new();
        self.lock_inner().cancel = Some(cancel.clone());

        let controller = self.clone();
        let engine = self.engine.clone();
        let task = tokio::spawn(async move {
            let session_app = frozen.app.clone();
            let hook_controller = controller.clone();
            let result = engine
                .run(
                    frozen.app,
                    frozen.config,
                    &prompts,
                    context,
                    audio,
                    cancel,
                    move |stage| {
                        let controller = hook_controller.clone();
                        async move {
                            controller.note_stage(epoch, stage);
                        }
                    },
                )
                .await;

            {
                let mut inner = controller.lock_inner();
                inner.task = None;
                inner.cancel = None;
                // A cancelled or replaced session owns the state now.
                if inner.epoch != epoch {
                    return;
                }
            }

            match result {
                Ok(EngineRun::Cancelled) => {
                    // cancel() already transitioned the stage.
                }
                Ok(EngineRun::Finished(record)) => {
                    if let Some(insert_error) = record.insert_error {
                        // The text must be recoverable before the error is
                        // observable.
                        if history_enabled {
                            if let Err(e) = controller.history.append(HistoryEntry::new(
                                &session_app,
                                record.final_text.clone(),
                                "error",
                            )) {
                                error!(error = %e, "history write failed");
                            }
                        }
                        controller.lock_inner().last_text = Some(record.final_text);
                        controller.fail(epoch, insert_error.user_message());
                    } else {
                        if history_enabled {
                            if let Err(e) = controller.history.append(HistoryEntry::new(
                                &session_app,
                                record.final_text.clone(),
                                "success",
                            )) {
                                error!(error = %e, "history write failed");
                            }
                        }
                        let finished = {
                            let mut inner = controller.lock_inner();
                            inner.epoch == epoch
                                && advance(&mut inner.stage, Stage::Success).is_ok()
                                && {
                                    inner.stage_entered_at = Instant::now();
                                    inner.last_text = Some(record.final_text);
                                    true
                                }
                        };
                        if finished {
                            info!(
                                transcription_ms = record.timings.transcription_ms,
                                enhancement_ms = record.timings.enhancement_ms,
                                "session finished"
                            );
                            controller.publish();
                            controller.schedule_reset(
                                epoch,
                                Stage::Success,
                                controller.tunables.success_dwell,
                                true,
                            );
                        }
                    }
                }
                Err(failure) => {
                    if history_enabled {
                        if let Some(text) = &failure.salvage {
                            if let Err(e) = controller.history.append(HistoryEntry::new(
                                &session_app,
                                text.clone(),
                                "error",
                            )) {
                                error!(error = %e, "history write failed");
                            }
                        }
                    }
                    controller.fail(epoch, failure.error.user_message());
                }
            }
        });
        self.lock_inner().task = Some(task);

        Ok(())
    }

    /// Cancel the active session. Idempotent: a no-op when nothing is
    /// active. Partial pipeline output is discarded and never written to
    /// history.
    pub async fn cancel(&self) -> Result<()> {
        let stage = self.lock_inner().stage;
        if !stage.is_active() {
            return Ok(());
        }

        if stage == Stage::Recording {
            if let Err(e) = self.audio.cancel().await {
                warn!(error = %e, "audio cancel failed");
            }
        }

        let epoch = {
            let mut inner = self.lock_inner();
            if !inner.stage.is_active() {
                return Ok(());
            }
            if let Some(flag) = inner.cancel.take() {
                flag.cancel();
            }
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            // Stale completions, watchdogs, and dwell timers lose here.
            inner.epoch = inner.epoch.wrapping_add(1);
            let _ = advance(&mut inner.stage, Stage::Cancelled);
            inner.stage_entered_at = Instant::now();
            inner.error_message = None;
            inner.epoch
        };
        info!("session cancelled");
        self.publish();
        self.schedule_reset(epoch, Stage::Cancelled, self.tunables.cancel_dwell, false);
        Ok(())
    }

    /// Stage hook from the pipeline engine. Ignores stale epochs and
    /// transitions the matrix forbids (e.g. after a cancel won the race).
    fn note_stage(&self, epoch: u64, stage: Stage) {
        let changed = {
            let mut inner = self.lock_inner();
            inner.epoch == epoch
                && inner.stage != stage
                && advance(&mut inner.stage, stage).is_ok()
                && {
                    inner.stage_entered_at = Instant::now();
                    true
                }
        };
        if changed {
            self.publish();
        }
    }

    fn fail(&self, epoch: u64, message: String) {
        let changed = {
            let mut inner = self.lock_inner();
            inner.epoch == epoch
                && advance(&mut inner.stage, Stage::Error).is_ok()
                && {
                    inner.stage_entered_at = Instant::now();
                    inner.error_message = Some(message.clone());
                    true
                }
        };
        if changed {
            error!(%message, "session failed");
            self.publish();
            self.schedule_reset(epoch, Stage::Error, self.tunables.error_dwell, false);
        }
    }

    /// Terminal stages dwell, then auto-reset to Idle. The success dwell is
    /// also the freshness bound of the reusable last result.
    fn schedule_reset(&self, epoch: u64, expected: Stage, delay: Duration, clear_last_text: bool) {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let changed = {
                let mut inner = controller.lock_inner();
                inner.epoch == epoch
                    && inner.stage == expected
                    && advance(&mut inner.stage, Stage::Idle).is_ok()
                    && {
                        inner.stage_entered_at = Instant::now();
                        inner.error_message = None;
                        inner.frozen = None;
                        if clear_last_text {
                            inner.last_text = None;
                        }
                        true
                    }
            };
            if changed {
                controller.publish();
            }
        });
    }

    fn publish(&self) {
        self.hub.publish_status(self.status());
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<A, F, S, E, I> StatusSource for SessionController<A, F, S, E, I>
where
    A: AudioSource + 'static,
    F: ForegroundProbe + 'static,
    S: SpeechToText + 'static,
    E: Enhancer + 'static,
    I: TextInserter + 'static,
{
    fn snapshot(&self) -> std::result::Result<SessionStatus, SyncError> {
        Ok(self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        MockAudioSource, MockEnhancer, MockForegroundProbe, MockSpeechToText, MockTextInserter,
        StageError,
    };
    use scrivo_core::profile::{MatchRule, ScenarioProfile};
    use scrivo_core::types::InsertMode;
    use scrivo_history::RetentionPolicy;

    type TestController = SessionController<
        MockAudioSource,
        MockForegroundProbe,
        MockSpeechToText,
        MockEnhancer,
        MockTextInserter,
    >;

    fn test_tunables() -> ControllerTunables {
        ControllerTunables {
            success_dwell: Duration::from_millis(40),
            error_dwell: Duration::from_millis(40),
            cancel_dwell: Duration::from_millis(40),
            max_recording: Duration::from_secs(10),
            level_interval: Duration::from_millis(10),
            min_audio_samples: 1,
        }
    }

    struct Fixture {
        controller: TestController,
        inserter: MockTextInserter,
        history: Arc<HistoryStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture(
        stt: MockSpeechToText,
        enhancer: MockEnhancer,
        inserter: MockTextInserter,
        probe: MockForegroundProbe,
        config: AppConfig,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(
            HistoryStore::at_path(dir.path().join("history.json"))
                .with_retention(RetentionPolicy::default()),
        );
        let controller = SessionController::new(
            Arc::new(MockAudioSource::new()),
            Arc::new(probe),
            Arc::new(stt),
            Arc::new(enhancer),
            Arc::new(inserter.clone()),
            history.clone(),
            StatusHub::new(),
            config,
            test_tunables(),
        );
        Fixture {
            controller,
            inserter,
            history,
            _dir: dir,
        }
    }

    fn plain_fixture(text: &str) -> Fixture {
        fixture(
            MockSpeechToText::fixed(text),
            MockEnhancer::new(),
            MockTextInserter::new(),
            MockForegroundProbe::new(),
            AppConfig::default(),
        )
    }

    async fn wait_for_stage(controller: &TestController, stage: Stage) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if controller.status().stage == stage {
                return;
            }
            if Instant::now() > deadline {
                panic!(
                    "timed out waiting for {stage}, stuck at {}",
                    controller.status().stage
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_full_session_success_then_dwell_reset() {
        let f = plain_fixture("hello world");

        f.controller.start_session().await.unwrap();
        let status = f.controller.status();
        assert_eq!(status.stage, Stage::Recording);
        assert!(status.is_recording);
        assert!(status.elapsed_ms.is_some());

        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Success).await;

        let status = f.controller.status();
        assert!(status.last_text_available);
        assert_eq!(status.last_text_preview.as_deref(), Some("hello world"));
        assert_eq!(
            f.inserter.insertions(),
            vec![("hello world".to_string(), InsertMode::Paste)]
        );

        let entries = f.history.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, "success");
        assert_eq!(entries[0].text, "hello world");

        // The dwell expires and the reusable result goes stale with it.
        wait_for_stage(&f.controller, Stage::Idle).await;
        let status = f.controller.status();
        assert!(!status.last_text_available);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_busy_start_is_rejected_not_queued() {
        let f = fixture(
            MockSpeechToText::fixed("slow").with_delay(Duration::from_millis(300)),
            MockEnhancer::new(),
            MockTextInserter::new(),
            MockForegroundProbe::new(),
            AppConfig::default(),
        );

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Transcribing).await;

        let err = f.controller.start_session().await.unwrap_err();
        assert!(err.to_string().contains("start rejected"));
        let err = f.controller.toggle().await.unwrap_err();
        assert!(err.to_string().contains("start rejected"));

        f.controller.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_start_while_recording_is_busy() {
        let f = plain_fixture("x");
        f.controller.start_session().await.unwrap();
        let err = f.controller.start_session().await.unwrap_err();
        assert!(err.to_string().contains("recording"));
        f.controller.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_a_noop() {
        let f = plain_fixture("x");
        f.controller.cancel().await.unwrap();
        f.controller.cancel().await.unwrap();
        assert_eq!(f.controller.status().stage, Stage::Idle);
    }

    #[tokio::test]
    async fn test_cancel_during_enhancing_skips_insertion_and_history() {
        let mut config = AppConfig::default();
        config.defaults.enable_enhancement = true;
        let f = fixture(
            MockSpeechToText::fixed("some words"),
            MockEnhancer::new().with_delay(Duration::from_secs(30)),
            MockTextInserter::new(),
            MockForegroundProbe::new(),
            config,
        );

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Enhancing).await;

        f.controller.cancel().await.unwrap();
        assert_eq!(f.controller.status().stage, Stage::Cancelled);

        // Give any stale completion a chance to misbehave, then verify the
        // pipeline never reached insertion and nothing hit history.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.inserter.insertions().is_empty());
        assert!(f.history.list().unwrap().is_empty());

        wait_for_stage(&f.controller, Stage::Idle).await;
    }

    #[tokio::test]
    async fn test_insertion_failure_writes_history_before_error() {
        let f = fixture(
            MockSpeechToText::fixed("precious words"),
            MockEnhancer::new(),
            MockTextInserter::failing(StageError::InsertionBlocked("denied".into())),
            MockForegroundProbe::new(),
            AppConfig::default(),
        );

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Error).await;

        // By the time Error is observable the text is already persisted.
        let entries = f.history.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, "error");
        assert_eq!(entries[0].text, "precious words");

        let status = f.controller.status();
        assert!(status.error.as_deref().unwrap().contains("history"));
        assert!(status.last_text_available);

        wait_for_stage(&f.controller, Stage::Idle).await;
    }

    #[tokio::test]
    async fn test_transcription_failure_surfaces_actionable_error() {
        let f = fixture(
            MockSpeechToText::failing(StageError::AuthFailed("401".into())),
            MockEnhancer::new(),
            MockTextInserter::new(),
            MockForegroundProbe::new(),
            AppConfig::default(),
        );

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Error).await;

        let status = f.controller.status();
        assert!(status.error.as_deref().unwrap().contains("API key"));
        assert!(f.history.list().unwrap().is_empty());

        // Errors are local to one session: the machine resets and a new
        // session can start.
        wait_for_stage(&f.controller, Stage::Idle).await;
        f.controller.start_session().await.unwrap();
        assert_eq!(f.controller.status().stage, Stage::Recording);
        f.controller.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_word_session_uses_enhancement() {
        // Enhancement is off in the defaults; "rewrite" flips it on for this
        // session and the trigger tokens are stripped.
        let f = plain_fixture("rewrite hello team rewrite");

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Success).await;

        assert_eq!(
            f.inserter.insertions(),
            vec![("HELLO TEAM".to_string(), InsertMode::Paste)]
        );
    }

    #[tokio::test]
    async fn test_profile_resolution_frozen_and_exposed() {
        let mut profile = ScenarioProfile::new("Terminal");
        profile
            .rules
            .push(MatchRule::ProcessNameEquals("cmd.exe".into()));
        profile.overrides.insert_mode = Some(InsertMode::PasteAndEnter);

        let mut config = AppConfig::default();
        config.profiles.push(profile);

        let probe = MockForegroundProbe::new()
            .with_app(ForegroundApp::new().with_process_name("cmd.exe"));
        let f = fixture(
            MockSpeechToText::fixed("ls"),
            MockEnhancer::new(),
            MockTextInserter::new(),
            probe,
            config,
        );

        f.controller.start_session().await.unwrap();
        assert_eq!(
            f.controller.status().active_profile.as_deref(),
            Some("Terminal")
        );

        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Success).await;
        assert_eq!(
            f.inserter.insertions(),
            vec![("ls".to_string(), InsertMode::PasteAndEnter)]
        );
    }

    #[tokio::test]
    async fn test_status_pushed_on_every_transition() {
        let f = plain_fixture("hi");
        let mut rx = f.controller.hub().subscribe_status();

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Idle).await;

        let mut seen = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            seen.push(frame.status.stage);
        }
        assert_eq!(seen.first(), Some(&Stage::Recording));
        assert!(seen.contains(&Stage::Transcribing));
        assert!(seen.contains(&Stage::Inserting));
        assert!(seen.contains(&Stage::Success));
        assert_eq!(seen.last(), Some(&Stage::Idle));
        // Enhancement was disabled, so that stage never appeared.
        assert!(!seen.contains(&Stage::Enhancing));
    }

    #[tokio::test]
    async fn test_pull_and_push_agree() {
        let f = plain_fixture("hi");
        let mut rx = f.controller.hub().subscribe_status();

        f.controller.start_session().await.unwrap();
        let pushed = rx.recv().await.unwrap().status;
        let pulled = f.controller.snapshot().unwrap();
        assert_eq!(pushed.stage, pulled.stage);
        assert_eq!(pushed.active_profile, pulled.active_profile);
        f.controller.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_mic_levels_emitted_while_recording_only() {
        let f = plain_fixture("hi");
        let mut levels = f.controller.hub().subscribe_levels();

        // The mock source emits one chunk during start, while the stage is
        // Recording.
        f.controller.start_session().await.unwrap();
        let frame = levels.try_recv().unwrap();
        assert!(frame.rms > 0.0);

        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Idle).await;
        assert!(levels.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watchdog_stops_runaway_recording() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::at_path(dir.path().join("history.json")));
        let mut tunables = test_tunables();
        tunables.max_recording = Duration::from_millis(30);

        let inserter = MockTextInserter::new();
        let controller: TestController = SessionController::new(
            Arc::new(MockAudioSource::new()),
            Arc::new(MockForegroundProbe::new()),
            Arc::new(MockSpeechToText::fixed("auto stopped")),
            Arc::new(MockEnhancer::new()),
            Arc::new(inserter.clone()),
            history,
            StatusHub::new(),
            AppConfig::default(),
            tunables,
        );

        controller.start_session().await.unwrap();
        // Never call stop: the watchdog must.
        wait_for_stage(&controller, Stage::Success).await;
        assert_eq!(inserter.insertions().len(), 1);
    }

    #[tokio::test]
    async fn test_history_disabled_skips_writes() {
        let mut config = AppConfig::default();
        config.defaults.history_enabled = false;
        let f = fixture(
            MockSpeechToText::fixed("ephemeral"),
            MockEnhancer::new(),
            MockTextInserter::new(),
            MockForegroundProbe::new(),
            config,
        );

        f.controller.start_session().await.unwrap();
        f.controller.stop_session().await.unwrap();
        wait_for_stage(&f.controller, Stage::Success).await;
        assert!(f.history.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_config_validates_and_retains_prior() {
        let f = plain_fixture("x");
        let mut bad = f.controller.config();
        let duplicate = bad.prompts[0].clone();
        bad.prompts.push(duplicate);

        assert!(f.controller.replace_config(bad).is_err());
        // The original document is still in effect.
        assert_eq!(f.controller.config().prompts.len(), 1);

        let mut good = f.controller.config();
        good.defaults.language = "en".to_string();
        f.controller.replace_config(good).unwrap();
        assert_eq!(f.controller.config().defaults.language, "en");
    }
}
