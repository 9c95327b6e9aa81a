//! Scenario profiles: per-application override bundles and their resolution.
//!
//! A profile matches when any of its rules match the foreground application.
//! Resolution picks exactly one winner among matching profiles and merges its
//! sparse overrides onto the global defaults; losing matches contribute
//! nothing, so every effective field has exactly one source.

use serde::{Deserialize, Serialize};

use crate::config::{ContextToggles, GlobalDefaults};
use crate::types::{ForegroundApp, InsertMode, ProfileId, PromptId};

/// Predicate over the foreground application identity.
///
/// Serialized with serde's externally-tagged encoding, e.g.
/// `{ "process_name_equals": "cmd.exe" }`. Decoded into this closed enum
/// before any matching runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    ExePathEquals(String),
    ProcessNameEquals(String),
    WindowTitleContains(String),
}

impl MatchRule {
    /// Case-sensitive evaluation; a missing field never matches and never
    /// errors.
    pub fn matches(&self, app: &ForegroundApp) -> bool {
        match self {
            MatchRule::ExePathEquals(expected) => {
                app.exe_path.as_deref().is_some_and(|p| p == expected)
            }
            MatchRule::ProcessNameEquals(expected) => {
                app.process_name.as_deref().is_some_and(|p| p == expected)
            }
            MatchRule::WindowTitleContains(needle) => app
                .window_title
                .as_deref()
                .is_some_and(|t| t.contains(needle.as_str())),
        }
    }
}

/// Partial override of the context-toggle group. Each sub-toggle merges
/// independently, so a profile can flip one toggle and inherit the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOverrides {
    pub use_clipboard: Option<bool>,
    pub use_selected_text: Option<bool>,
    pub use_window_context: Option<bool>,
    pub use_custom_vocabulary: Option<bool>,
    pub use_ocr: Option<bool>,
}

impl ContextOverrides {
    fn apply(&self, toggles: &mut ContextToggles) {
        if let Some(v) = self.use_clipboard {
            toggles.use_clipboard = v;
        }
        if let Some(v) = self.use_selected_text {
            toggles.use_selected_text = v;
        }
        if let Some(v) = self.use_window_context {
            toggles.use_window_context = v;
        }
        if let Some(v) = self.use_custom_vocabulary {
            toggles.use_custom_vocabulary = v;
        }
        if let Some(v) = self.use_ocr {
            toggles.use_ocr = v;
        }
    }
}

/// Sparse mirror of `GlobalDefaults`: absent fields inherit the default,
/// present fields replace it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideSet {
    pub enable_enhancement: Option<bool>,
    pub prompt_id: Option<PromptId>,
    pub insert_mode: Option<InsertMode>,
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,
    pub language: Option<String>,
    pub enhancer_base_url: Option<String>,
    pub enhancer_model: Option<String>,
    pub context: ContextOverrides,
}

/// A named, conditionally-activated override bundle keyed to a foreground
/// application match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioProfile {
    pub id: ProfileId,
    pub name: String,
    pub enabled: bool,
    /// Optional user-assigned priority; lower values win. Profiles without
    /// one rank after every profile that has one.
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub rules: Vec<MatchRule>,
    #[serde(default)]
    pub overrides: OverrideSet,
}

impl ScenarioProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(),
            name: name.into(),
            enabled: true,
            priority: None,
            rules: Vec::new(),
            overrides: OverrideSet::default(),
        }
    }

    /// Any-rule-matches semantics. A disabled profile or a profile with no
    /// rules never matches.
    pub fn matches(&self, app: &ForegroundApp) -> bool {
        self.enabled && self.rules.iter().any(|rule| rule.matches(app))
    }
}

/// Fully resolved configuration driving one session.
///
/// Derived, never persisted. `matched_profile` exposes which profile (if
/// any) supplied overrides so observers can display the resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub enable_enhancement: bool,
    pub prompt_id: Option<PromptId>,
    pub insert_mode: InsertMode,
    pub stt_provider: String,
    pub stt_model: String,
    pub language: String,
    pub enhancer_base_url: String,
    pub enhancer_model: String,
    pub context: ContextToggles,
    pub matched_profile: Option<ProfileId>,
}

/// Per-invocation overrides applied after profile resolution, e.g. the tray
/// menu forcing a specific profile or prompt for the next session only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EphemeralOverrides {
    pub forced_profile_id: Option<ProfileId>,
    pub forced_prompt_id: Option<PromptId>,
    pub forced_enhancement: Option<bool>,
}

/// Resolve the configuration for one session.
///
/// Pure and total: identical inputs always produce the identical result, and
/// resolution never fails. Among enabled matching profiles the winner is
/// chosen by explicit priority (ascending), then creation order (list
/// position), then id lexical order; the user-facing contract is
/// "first matching profile wins". A forced profile id bypasses matching but
/// still honors the enabled flag.
pub fn resolve_effective_config(
    defaults: &GlobalDefaults,
    profiles: &[ScenarioProfile],
    app: &ForegroundApp,
    ephemeral: &EphemeralOverrides,
) -> EffectiveConfig {
    let matched = if let Some(forced) = &ephemeral.forced_profile_id {
        profiles.iter().find(|p| &p.id == forced && p.enabled)
    } else {
        profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.matches(app))
            .min_by_key(|(position, p)| {
                (
                    p.priority.is_none(),
                    p.priority.unwrap_or(0),
                    *position,
                    p.id.0.to_string(),
                )
            })
            .map(|(_, p)| p)
    };

    let mut cfg = EffectiveConfig {
        enable_enhancement: defaults.enable_enhancement,
        prompt_id: defaults.prompt_id.clone(),
        insert_mode: defaults.insert_mode,
        stt_provider: defaults.stt_provider.clone(),
        stt_model: defaults.stt_model.clone(),
        language: defaults.language.clone(),
        enhancer_base_url: defaults.enhancer_base_url.clone(),
        enhancer_model: defaults.enhancer_model.clone(),
        context: defaults.context.clone(),
        matched_profile: matched.map(|p| p.id.clone()),
    };

    if let Some(profile) = matched {
        apply_overrides(&mut cfg, &profile.overrides);
    }

    if let Some(enabled) = ephemeral.forced_enhancement {
        cfg.enable_enhancement = enabled;
    }
    if let Some(prompt_id) = &ephemeral.forced_prompt_id {
        cfg.prompt_id = Some(prompt_id.clone());
        // Picking a prompt only makes sense with enhancement on.
        cfg.enable_enhancement = true;
    }

    cfg
}

fn apply_overrides(cfg: &mut EffectiveConfig, overrides: &OverrideSet) {
    if let Some(v) = overrides.enable_enhancement {
        cfg.enable_enhancement = v;
    }
    if let Some(v) = &overrides.prompt_id {
        cfg.prompt_id = Some(v.clone());
    }
    if let Some(v) = overrides.insert_mode {
        cfg.insert_mode = v;
    }
    if let Some(v) = &overrides.stt_provider {
        cfg.stt_provider = v.clone();
    }
    if let Some(v) = &overrides.stt_model {
        cfg.stt_model = v.clone();
    }
    if let Some(v) = &overrides.language {
        cfg.language = v.clone();
    }
    if let Some(v) = &overrides.enhancer_base_url {
        cfg.enhancer_base_url = v.clone();
    }
    if let Some(v) = &overrides.enhancer_model {
        cfg.enhancer_model = v.clone();
    }
    overrides.context.apply(&mut cfg.context);
}
