use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("Artifact not found: {reference}")]
    ArtifactNotFound { reference: String },

    #[error("Invalid artifact reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse dataset: {0}")]
    Parse(String),

    #[error("Failed to publish artifact: {0}")]
    Publish(String),

    #[error("Metadata (de)serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CleaningError {
    /// Stable name of the error class, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            CleaningError::ArtifactNotFound { .. } => "artifact_not_found",
            CleaningError::InvalidReference { .. } => "invalid_reference",
            CleaningError::Io(_) => "io",
            CleaningError::Parse(_) => "parse",
            CleaningError::Publish(_) => "publish",
            CleaningError::Metadata(_) => "metadata",
            CleaningError::Config(_) => "config",
        }
    }

    pub(crate) fn not_found(reference: impl Into<String>) -> Self {
        CleaningError::ArtifactNotFound {
            reference: reference.into(),
        }
    }
}

impl From<toml::de::Error> for CleaningError {
    fn from(e: toml::de::Error) -> Self {
        CleaningError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CleaningError>;
