use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a scenario profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable identifier for a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptId(pub Uuid);

impl PromptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PromptId {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the application that owned the foreground window when a
/// session started. Sampled at match time; never persisted as an entity.
///
/// Every field is optional: the probe may fail to resolve any of them
/// (elevated processes, lock screen, bare desktop). Missing fields simply
/// never match a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundApp {
    pub process_name: Option<String>,
    pub exe_path: Option<String>,
    pub window_title: Option<String>,
}

impl ForegroundApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn with_exe_path(mut self, path: impl Into<String>) -> Self {
        self.exe_path = Some(path.into());
        self
    }

    pub fn with_window_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = Some(title.into());
        self
    }
}

/// How final text is delivered into the target application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Paste via the clipboard.
    #[default]
    Paste,
    /// Paste, then send Enter (terminals, chat inputs).
    PasteAndEnter,
}
