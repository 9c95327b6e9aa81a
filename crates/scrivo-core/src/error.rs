use thiserror::Error;

/// Top-level error type for the Scrivo system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for ScrivoError`
/// so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScrivoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Enhancement error: {0}")]
    Enhancement(String),

    #[error("Insertion error: {0}")]
    Insertion(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ScrivoError {
    fn from(err: toml::de::Error) -> Self {
        ScrivoError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScrivoError {
    fn from(err: toml::ser::Error) -> Self {
        ScrivoError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScrivoError {
    fn from(err: serde_json::Error) -> Self {
        ScrivoError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Scrivo operations.
pub type Result<T> = std::result::Result<T, ScrivoError>;
