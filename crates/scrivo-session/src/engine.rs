//! Staged pipeline execution: transcribe, trigger words, optional
//! enhancement, insertion.
//!
//! The engine is handed a frozen effective config and the captured audio;
//! it never re-resolves profiles mid-session. A stage hook reports progress
//! to the controller, and the cancel flag is honored at every stage
//! boundary. Insertion failure is not an engine failure: the record still
//! carries the final text so the caller can persist it before surfacing the
//! error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scrivo_core::config::PromptTemplate;
use scrivo_core::profile::EffectiveConfig;
use scrivo_core::status::Stage;
use scrivo_core::text::{scrub_enhancement, scrub_transcript};
use scrivo_core::trigger::apply_trigger_words;
use scrivo_core::types::ForegroundApp;

use crate::pipeline::{
    AudioInput, CancelFlag, ContextSnapshot, EnhanceRequest, EnhancedText, Enhancer, SpeechToText,
    StageError, TextInserter, Transcript,
};

/// Wall-clock cost of the provider stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTimings {
    pub transcription_ms: Option<u64>,
    pub enhancement_ms: Option<u64>,
}

/// What one finished pipeline run produced.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub app: ForegroundApp,
    pub config: EffectiveConfig,
    pub transcript: Transcript,
    pub enhanced: Option<EnhancedText>,
    pub final_text: String,
    pub timings: SessionTimings,
    /// Set when delivery failed; the final text above is still valid and
    /// must be persisted before the failure is surfaced.
    pub insert_error: Option<StageError>,
}

/// Engine result: either the pipeline ran to its end (possibly with a failed
/// insertion) or a cancel request stopped it between stages.
#[derive(Debug, Clone)]
pub enum EngineRun {
    Finished(SessionRecord),
    Cancelled,
}

/// A stage failure plus whatever text is worth salvaging into history.
#[derive(Debug, Clone)]
pub struct EngineFailure {
    pub error: StageError,
    pub salvage: Option<String>,
}

/// Runs the post-recording stages against the provider boundaries.
pub struct PipelineEngine<S, E, I> {
    stt: Arc<S>,
    enhancer: Arc<E>,
    inserter: Arc<I>,
}

impl<S, E, I> PipelineEngine<S, E, I>
where
    S: SpeechToText,
    E: Enhancer,
    I: TextInserter,
{
    pub fn new(stt: Arc<S>, enhancer: Arc<E>, inserter: Arc<I>) -> Self {
        Self {
            stt,
            enhancer,
            inserter,
        }
    }

    /// Run transcription, trigger-word processing, optional enhancement, and
    /// insertion. `on_stage` fires as each stage is entered.
    #[allow(clippy::too_many_arguments)]
    pub async fn run<F, Fut>(
        &self,
        app: ForegroundApp,
        config: EffectiveConfig,
        prompts: &[PromptTemplate],
        context: ContextSnapshot,
        audio: AudioInput,
        cancel: CancelFlag,
        on_stage: F,
    ) -> Result<EngineRun, EngineFailure>
    where
        F: Fn(Stage) -> Fut,
        Fut: Future<Output = ()>,
    {
        if cancel.is_cancelled() {
            return Ok(EngineRun::Cancelled);
        }

        on_stage(Stage::Transcribing).await;
        let t0 = Instant::now();
        let transcript = self
            .stt
            .transcribe(audio, &config.stt_provider, &config.stt_model, &config.language)
            .await
            .map_err(|error| EngineFailure {
                error,
                salvage: None,
            })?;
        let transcription_ms = Some(ms(t0.elapsed()));

        let cleaned = scrub_transcript(&transcript.text);
        if cleaned.is_empty() {
            return Err(EngineFailure {
                error: StageError::Provider("no speech detected".to_string()),
                salvage: None,
            });
        }

        let decision = apply_trigger_words(&cleaned, prompts);
        let mut final_text = decision.text.clone();
        let prompt_id = decision
            .selected_prompt
            .clone()
            .or_else(|| config.prompt_id.clone());

        if cancel.is_cancelled() {
            return Ok(EngineRun::Cancelled);
        }

        let mut enhanced = None;
        let mut enhancement_ms = None;
        if config.enable_enhancement || decision.force_enhancement {
            on_stage(Stage::Enhancing).await;

            let prompt = prompt_id
                .as_ref()
                .and_then(|id| prompts.iter().find(|p| &p.id == id))
                .or_else(|| prompts.first())
                .ok_or_else(|| EngineFailure {
                    error: StageError::Provider("no enhancement prompt configured".to_string()),
                    salvage: Some(final_text.clone()),
                })?;

            let request = EnhanceRequest {
                base_url: config.enhancer_base_url.clone(),
                model: config.enhancer_model.clone(),
                prompt_text: prompt.prompt_text.clone(),
                transcript: final_text.clone(),
                context: gate_context(&config, &context),
            };

            let e0 = Instant::now();
            let output = self
                .enhancer
                .enhance(request)
                .await
                .map_err(|error| EngineFailure {
                    error,
                    salvage: Some(final_text.clone()),
                })?;
            enhancement_ms = Some(ms(e0.elapsed()));

            final_text = scrub_enhancement(&output.text);
            enhanced = Some(output);
        }

        if cancel.is_cancelled() {
            return Ok(EngineRun::Cancelled);
        }

        on_stage(Stage::Inserting).await;
        let insert_error = self
            .inserter
            .insert(&final_text, config.insert_mode)
            .await
            .err();

        Ok(EngineRun::Finished(SessionRecord {
            app,
            config,
            transcript,
            enhanced,
            final_text,
            timings: SessionTimings {
                transcription_ms,
                enhancement_ms,
            },
            insert_error,
        }))
    }
}

/// Drop context fields the effective toggles exclude.
fn gate_context(config: &EffectiveConfig, snapshot: &ContextSnapshot) -> ContextSnapshot {
    ContextSnapshot {
        clipboard: config
            .context
            .use_clipboard
            .then(|| snapshot.clipboard.clone())
            .flatten(),
        selected_text: config
            .context
            .use_selected_text
            .then(|| snapshot.selected_text.clone())
            .flatten(),
        window_context: config
            .context
            .use_window_context
            .then(|| snapshot.window_context.clone())
            .flatten(),
        custom_vocabulary: config
            .context
            .use_custom_vocabulary
            .then(|| snapshot.custom_vocabulary.clone())
            .flatten(),
    }
}

fn ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MockEnhancer, MockSpeechToText, MockTextInserter};
    use scrivo_core::config::{AppConfig, GlobalDefaults};
    use scrivo_core::profile::{resolve_effective_config, EphemeralOverrides};
    use scrivo_core::types::{InsertMode, PromptId};
    use std::sync::Mutex;

    fn effective(defaults: &GlobalDefaults) -> EffectiveConfig {
        resolve_effective_config(
            defaults,
            &[],
            &ForegroundApp::new(),
            &EphemeralOverrides::default(),
        )
    }

    fn audio() -> AudioInput {
        AudioInput {
            sample_rate_hz: 16_000,
            samples: vec![0.1; 160],
        }
    }

    fn engine(
        stt: MockSpeechToText,
        enhancer: MockEnhancer,
        inserter: MockTextInserter,
    ) -> PipelineEngine<MockSpeechToText, MockEnhancer, MockTextInserter> {
        PipelineEngine::new(Arc::new(stt), Arc::new(enhancer), Arc::new(inserter))
    }

    async fn run_plain(
        engine: &PipelineEngine<MockSpeechToText, MockEnhancer, MockTextInserter>,
        config: EffectiveConfig,
        prompts: &[PromptTemplate],
    ) -> Result<EngineRun, EngineFailure> {
        engine
            .run(
                ForegroundApp::new(),
                config,
                prompts,
                ContextSnapshot::default(),
                audio(),
                CancelFlag::new(),
                |_| async {},
            )
            .await
    }

    #[tokio::test]
    async fn test_plain_dictation_skips_enhancement() {
        let inserter = MockTextInserter::new();
        let engine = engine(
            MockSpeechToText::fixed("hello world"),
            MockEnhancer::new(),
            inserter.clone(),
        );
        let config = effective(&GlobalDefaults::default());

        let run = run_plain(&engine, config, &[]).await.unwrap();
        let record = match run {
            EngineRun::Finished(r) => r,
            EngineRun::Cancelled => panic!("unexpected cancel"),
        };

        assert_eq!(record.final_text, "hello world");
        assert!(record.enhanced.is_none());
        assert!(record.insert_error.is_none());
        assert!(record.timings.transcription_ms.is_some());
        assert!(record.timings.enhancement_ms.is_none());
        assert_eq!(
            inserter.insertions(),
            vec![("hello world".to_string(), InsertMode::Paste)]
        );
    }

    #[tokio::test]
    async fn test_enhancement_when_enabled() {
        let inserter = MockTextInserter::new();
        let engine = engine(
            MockSpeechToText::fixed("hello world"),
            MockEnhancer::new(),
            inserter.clone(),
        );
        let mut defaults = GlobalDefaults::default();
        defaults.enable_enhancement = true;
        let config = effective(&defaults);
        let prompts = AppConfig::default().prompts;

        let run = run_plain(&engine, config, &prompts).await.unwrap();
        let record = match run {
            EngineRun::Finished(r) => r,
            EngineRun::Cancelled => panic!("unexpected cancel"),
        };

        assert_eq!(record.final_text, "HELLO WORLD");
        assert!(record.enhanced.is_some());
        assert!(record.timings.enhancement_ms.is_some());
    }

    #[tokio::test]
    async fn test_trigger_word_forces_enhancement() {
        let inserter = MockTextInserter::new();
        let engine = engine(
            MockSpeechToText::fixed("rewrite hello team rewrite"),
            MockEnhancer::new(),
            inserter.clone(),
        );
        // Enhancement is off by default; the trigger overrides that.
        let config = effective(&GlobalDefaults::default());
        let prompts = AppConfig::default().prompts;

        let run = run_plain(&engine, config, &prompts).await.unwrap();
        let record = match run {
            EngineRun::Finished(r) => r,
            EngineRun::Cancelled => panic!("unexpected cancel"),
        };

        // Both trigger occurrences are stripped before enhancement.
        assert_eq!(record.final_text, "HELLO TEAM");
        assert!(record.enhanced.is_some());
    }

    #[tokio::test]
    async fn test_stt_failure_has_nothing_to_salvage() {
        let engine = engine(
            MockSpeechToText::failing(StageError::Network("dns".into())),
            MockEnhancer::new(),
            MockTextInserter::new(),
        );
        let config = effective(&GlobalDefaults::default());

        let failure = run_plain(&engine, config, &[]).await.unwrap_err();
        assert!(matches!(failure.error, StageError::Network(_)));
        assert!(failure.salvage.is_none());
    }

    #[tokio::test]
    async fn test_enhancement_failure_salvages_transcript() {
        let engine = engine(
            MockSpeechToText::fixed("keep this text"),
            MockEnhancer::failing(StageError::AuthFailed("bad key".into())),
            MockTextInserter::new(),
        );
        let mut defaults = GlobalDefaults::default();
        defaults.enable_enhancement = true;
        let config = effective(&defaults);
        let prompts = AppConfig::default().prompts;

        let failure = run_plain(&engine, config, &prompts).await.unwrap_err();
        assert!(matches!(failure.error, StageError::AuthFailed(_)));
        assert_eq!(failure.salvage.as_deref(), Some("keep this text"));
    }

    #[tokio::test]
    async fn test_insertion_failure_keeps_final_text() {
        let engine = engine(
            MockSpeechToText::fixed("precious words"),
            MockEnhancer::new(),
            MockTextInserter::failing(StageError::InsertionBlocked("denied".into())),
        );
        let config = effective(&GlobalDefaults::default());

        let run = run_plain(&engine, config, &[]).await.unwrap();
        let record = match run {
            EngineRun::Finished(r) => r,
            EngineRun::Cancelled => panic!("unexpected cancel"),
        };

        assert!(matches!(
            record.insert_error,
            Some(StageError::InsertionBlocked(_))
        ));
        assert_eq!(record.final_text, "precious words");
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_does_nothing() {
        let inserter = MockTextInserter::new();
        let engine = engine(
            MockSpeechToText::fixed("ignored"),
            MockEnhancer::new(),
            inserter.clone(),
        );
        let config = effective(&GlobalDefaults::default());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let run = engine
            .run(
                ForegroundApp::new(),
                config,
                &[],
                ContextSnapshot::default(),
                audio(),
                cancel,
                |_| async {},
            )
            .await
            .unwrap();
        assert!(matches!(run, EngineRun::Cancelled));
        assert!(inserter.insertions().is_empty());
    }

    #[tokio::test]
    async fn test_stage_hook_reports_progression() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let stages_in_hook = stages.clone();

        let engine = engine(
            MockSpeechToText::fixed("hello"),
            MockEnhancer::new(),
            MockTextInserter::new(),
        );
        let mut defaults = GlobalDefaults::default();
        defaults.enable_enhancement = true;
        let config = effective(&defaults);
        let prompts = AppConfig::default().prompts;

        engine
            .run(
                ForegroundApp::new(),
                config,
                &prompts,
                ContextSnapshot::default(),
                audio(),
                CancelFlag::new(),
                move |stage| {
                    let stages = stages_in_hook.clone();
                    async move {
                        stages.lock().unwrap().push(stage);
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![Stage::Transcribing, Stage::Enhancing, Stage::Inserting]
        );
    }

    #[tokio::test]
    async fn test_missing_prompt_salvages_text() {
        let engine = engine(
            MockSpeechToText::fixed("some words"),
            MockEnhancer::new(),
            MockTextInserter::new(),
        );
        let mut defaults = GlobalDefaults::default();
        defaults.enable_enhancement = true;
        let config = effective(&defaults);

        // Empty prompt library with enhancement on.
        let failure = run_plain(&engine, config, &[]).await.unwrap_err();
        assert!(matches!(failure.error, StageError::Provider(_)));
        assert_eq!(failure.salvage.as_deref(), Some("some words"));
    }

    #[tokio::test]
    async fn test_context_gating_respects_toggles() {
        // An enhancer that records the context it was given.
        struct Capture(Arc<Mutex<Option<ContextSnapshot>>>);
        impl Enhancer for Capture {
            async fn enhance(&self, request: EnhanceRequest) -> Result<EnhancedText, StageError> {
                *self.0.lock().unwrap() = Some(request.context.clone());
                Ok(EnhancedText {
                    text: request.transcript,
                    provider: "capture".to_string(),
                    model: request.model,
                })
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let engine = PipelineEngine::new(
            Arc::new(MockSpeechToText::fixed("hi")),
            Arc::new(Capture(seen.clone())),
            Arc::new(MockTextInserter::new()),
        );

        let mut defaults = GlobalDefaults::default();
        defaults.enable_enhancement = true;
        defaults.context.use_clipboard = false;
        defaults.context.use_window_context = true;
        let config = effective(&defaults);
        let prompts = AppConfig::default().prompts;

        let snapshot = ContextSnapshot {
            clipboard: Some("secret clipboard".to_string()),
            window_context: Some("Active window: Mail".to_string()),
            ..Default::default()
        };

        engine
            .run(
                ForegroundApp::new(),
                config,
                &prompts,
                snapshot,
                audio(),
                CancelFlag::new(),
                |_| async {},
            )
            .await
            .unwrap();

        let context = seen.lock().unwrap().clone().unwrap();
        assert!(context.clipboard.is_none());
        assert_eq!(
            context.window_context.as_deref(),
            Some("Active window: Mail")
        );
    }

    #[tokio::test]
    async fn test_profile_prompt_override_selected() {
        // Two prompts; the config points at the second one.
        let mut prompts = AppConfig::default().prompts;
        let special = PromptTemplate {
            id: PromptId::new(),
            title: "Special".to_string(),
            prompt_text: "special instructions".to_string(),
            trigger_words: vec![],
        };
        prompts.push(special.clone());

        struct PromptCapture(Arc<Mutex<Option<String>>>);
        impl Enhancer for PromptCapture {
            async fn enhance(&self, request: EnhanceRequest) -> Result<EnhancedText, StageError> {
                *self.0.lock().unwrap() = Some(request.prompt_text.clone());
                Ok(EnhancedText {
                    text: request.transcript,
                    provider: "capture".to_string(),
                    model: request.model,
                })
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let engine = PipelineEngine::new(
            Arc::new(MockSpeechToText::fixed("hi")),
            Arc::new(PromptCapture(seen.clone())),
            Arc::new(MockTextInserter::new()),
        );

        let mut defaults = GlobalDefaults::default();
        defaults.enable_enhancement = true;
        defaults.prompt_id = Some(special.id.clone());
        let config = effective(&defaults);

        engine
            .run(
                ForegroundApp::new(),
                config,
                &prompts,
                ContextSnapshot::default(),
                audio(),
                CancelFlag::new(),
                |_| async {},
            )
            .await
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("special instructions")
        );
    }
}
