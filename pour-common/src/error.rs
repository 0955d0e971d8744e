// pour-common/src/error.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PourError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Parsing Error in {0}: {1}")]
    Parse(&'static str, String),

    #[error("Unsatisfied dependency '{name}': requires {required}, found {}", .found.as_deref().unwrap_or("nothing"))]
    UnsatisfiedDependency {
        name: String,
        required: String,
        found: Option<String>,
    },

    #[error("Network Error for '{url}': {message}")]
    Network {
        url: String,
        message: String,
        retryable: bool,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Integrity Error for '{url}': expected sha256 {expected}, got {actual}")]
    IntegrityError {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Missing install artifact: {}", .0.display())]
    MissingInstallArtifact(PathBuf),

    #[error("Patch pattern '{pattern}' not found in {}", .file.display())]
    PatchMismatch { file: PathBuf, pattern: String },

    #[error("Cannot create link {}: a directory is in the way", .0.display())]
    LinkConflict(PathBuf),

    #[error("Extraction Error: {0}")]
    Extraction(String),

    #[error("Install step {index} ({action}) failed: {source}")]
    StepFailed {
        index: usize,
        action: String,
        #[source]
        source: Box<PourError>,
    },

    #[error("Failed to execute command: {0}")]
    CommandExec(String),

    #[error("Another install of '{0}' is in progress")]
    Locked(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl PourError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for PourError {
    fn from(err: std::io::Error) -> Self {
        PourError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for PourError {
    fn from(err: reqwest::Error) -> Self {
        PourError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for PourError {
    fn from(err: serde_json::Error) -> Self {
        PourError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for PourError {
    fn from(err: toml::de::Error) -> Self {
        PourError::Toml(Arc::new(err))
    }
}

impl From<semver::Error> for PourError {
    fn from(err: semver::Error) -> Self {
        PourError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PourError>;
