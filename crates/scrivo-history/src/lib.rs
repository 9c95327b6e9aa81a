//! Scrivo history crate - append-only log of completed and failed sessions.
//!
//! Every finished session (success or error, never cancelled) is appended so
//! that text is recoverable even when insertion into the target application
//! fails. The log is capped by a retention policy: maximum entry count and
//! maximum age.

pub mod store;

pub use store::{HistoryEntry, HistoryStore, RetentionPolicy};
