use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use scrivo_core::error::{Result, ScrivoError};
use scrivo_core::types::ForegroundApp;

/// One completed or failed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub process_name: Option<String>,
    pub exe_path: Option<String>,
    pub window_title: Option<String>,
    pub text: String,
    /// Stage outcome label: "success" or "error".
    pub outcome: String,
}

impl HistoryEntry {
    pub fn new(app: &ForegroundApp, text: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            process_name: app.process_name.clone(),
            exe_path: app.exe_path.clone(),
            window_title: app.window_title.clone(),
            text: text.into(),
            outcome: outcome.into(),
        }
    }
}

/// Caps applied on every append: oldest entries fall off first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_entries: usize,
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_entries: 200,
            max_age_days: 90,
        }
    }
}

/// JSON-file-backed history log.
///
/// Writes go through a temp file so a crash mid-write never corrupts the
/// log. The file holds entries oldest-first; `list` returns that order.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    retention: RetentionPolicy,
}

impl HistoryStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first. A missing file is an empty log.
    pub fn list(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let entries: Vec<HistoryEntry> = serde_json::from_str(&raw)?;
        Ok(entries)
    }

    /// Append one entry, then apply the retention policy.
    pub fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.list()?;
        entries.push(entry);
        entries = self.prune(entries);
        self.write(&entries)?;
        debug!(total = entries.len(), "history entry appended");
        Ok(())
    }

    /// Remove one entry by id. Unknown ids are an error so the caller can
    /// surface a stale-view message.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let mut entries = self.list()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(ScrivoError::History(format!("no history entry with id {id}")));
        }
        self.write(&entries)
    }

    /// Drop the whole log.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn prune(&self, mut entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention.max_age_days));
        entries.retain(|e| e.timestamp >= cutoff);

        let max = self.retention.max_entries.max(1);
        if entries.len() > max {
            let start = entries.len() - max;
            entries = entries.split_off(start);
        }
        entries
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        match fs::rename(&tmp, &self.path) {
            Ok(()) => Ok(()),
            Err(_) if self.path.exists() => {
                fs::remove_file(&self.path)?;
                fs::rename(&tmp, &self.path)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
