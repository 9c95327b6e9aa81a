//! Configuration document and its file-backed store.
//!
//! The whole document (defaults + ordered profiles + prompt library) is
//! loaded from TOML and replaced atomically as a unit. `replace` validates
//! before committing; a rejected document leaves the previous state on disk
//! untouched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScrivoError};
use crate::profile::ScenarioProfile;
use crate::types::{InsertMode, PromptId};

/// Which ambient context sources feed the enhancement prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextToggles {
    pub use_clipboard: bool,
    pub use_selected_text: bool,
    pub use_window_context: bool,
    pub use_custom_vocabulary: bool,
    pub use_ocr: bool,
}

impl Default for ContextToggles {
    fn default() -> Self {
        Self {
            use_clipboard: true,
            use_selected_text: false,
            use_window_context: true,
            use_custom_vocabulary: true,
            use_ocr: false,
        }
    }
}

/// Baseline configuration every session starts from. Scenario profiles
/// override individual fields per foreground application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDefaults {
    pub enable_enhancement: bool,
    pub prompt_id: Option<PromptId>,
    pub insert_mode: InsertMode,
    pub stt_provider: String,
    pub stt_model: String,
    /// BCP-47 language code, or "auto" for provider-side detection.
    pub language: String,
    pub enhancer_base_url: String,
    pub enhancer_model: String,
    /// Preferred capture device; `None` means the system default.
    pub microphone_device: Option<String>,
    pub history_enabled: bool,
    pub context: ContextToggles,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            // Off by default: dictation should work out of the box without
            // any cloud credentials.
            enable_enhancement: false,
            prompt_id: None,
            insert_mode: InsertMode::Paste,
            stt_provider: "local".to_string(),
            stt_model: "whisper-base".to_string(),
            language: "auto".to_string(),
            enhancer_base_url: "https://api.openai.com/v1".to_string(),
            enhancer_model: "gpt-4o-mini".to_string(),
            microphone_device: None,
            history_enabled: true,
            context: ContextToggles::default(),
        }
    }
}

/// A reusable enhancement instruction with its trigger words.
///
/// Library order is insertion order and is the documented scan order for
/// trigger-word detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: PromptId,
    pub title: String,
    pub prompt_text: String,
    #[serde(default)]
    pub trigger_words: Vec<String>,
}

/// The whole persisted configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub defaults: GlobalDefaults,
    pub profiles: Vec<ScenarioProfile>,
    pub prompts: Vec<PromptTemplate>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: GlobalDefaults::default(),
            profiles: Vec::new(),
            prompts: vec![PromptTemplate {
                id: PromptId::new(),
                title: "Default".to_string(),
                prompt_text: "Fix grammar, punctuation, and capitalization. \
                              Output only the corrected text."
                    .to_string(),
                trigger_words: vec!["rewrite".to_string(), "clean up".to_string()],
            }],
        }
    }
}

impl AppConfig {
    /// Reject documents that would leave resolution or the prompt library in
    /// an inconsistent state. Called before every commit.
    pub fn validate(&self) -> Result<()> {
        let mut profile_ids = std::collections::HashSet::new();
        for profile in &self.profiles {
            if profile.name.trim().is_empty() {
                return Err(ScrivoError::Config(
                    "profile name must not be blank".to_string(),
                ));
            }
            if !profile_ids.insert(&profile.id) {
                return Err(ScrivoError::Config(format!(
                    "duplicate profile id: {}",
                    profile.id.0
                )));
            }
        }

        let mut prompt_ids = std::collections::HashSet::new();
        for prompt in &self.prompts {
            if prompt.title.trim().is_empty() {
                return Err(ScrivoError::Config(
                    "prompt title must not be blank".to_string(),
                ));
            }
            if !prompt_ids.insert(&prompt.id) {
                return Err(ScrivoError::Config(format!(
                    "duplicate prompt id: {}",
                    prompt.id.0
                )));
            }
            if prompt.trigger_words.iter().any(|w| w.trim().is_empty()) {
                return Err(ScrivoError::Config(format!(
                    "prompt '{}' has a blank trigger word",
                    prompt.title
                )));
            }
        }

        if let Some(id) = &self.defaults.prompt_id {
            if !prompt_ids.contains(id) {
                return Err(ScrivoError::Config(format!(
                    "defaults reference unknown prompt id: {}",
                    id.0
                )));
            }
        }
        for profile in &self.profiles {
            if let Some(id) = &profile.overrides.prompt_id {
                if !prompt_ids.contains(id) {
                    return Err(ScrivoError::Config(format!(
                        "profile '{}' references unknown prompt id: {}",
                        profile.name, id.0
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a prompt by id.
    pub fn prompt(&self, id: &PromptId) -> Option<&PromptTemplate> {
        self.prompts.iter().find(|p| &p.id == id)
    }
}

/// File-backed store for the configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document from TOML.
    pub fn load(&self) -> Result<AppConfig> {
        let content = std::fs::read_to_string(&self.path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the document, falling back to defaults if the file is missing or
    /// unreadable.
    pub fn load_or_default(&self) -> AppConfig {
        match self.load() {
            Ok(config) => {
                info!("Configuration loaded from {}", self.path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    self.path.display(),
                    e
                );
                AppConfig::default()
            }
        }
    }

    /// Persist the document. Writes to a temp file first so a crash never
    /// leaves a half-written config behind.
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        replace_file(&tmp, &self.path)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    /// Whole-document replace: validate first, commit only on success.
    /// A rejected document leaves the prior state untouched.
    pub fn replace(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        self.save(config)
    }
}

/// Rename `tmp` over `dst`. On Windows a plain rename fails when the
/// destination exists, so fall back to remove-then-rename.
fn replace_file(tmp: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(tmp, dst) {
        Ok(()) => Ok(()),
        Err(_) if dst.exists() => {
            std::fs::remove_file(dst)?;
            std::fs::rename(tmp, dst)
        }
        Err(e) => Err(e),
    }
}
