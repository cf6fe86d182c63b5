use std::path::PathBuf;
use thiserror::Error;

pub type QmdResult<T> = Result<T, QmdError>;

#[derive(Debug, Error)]
pub enum QmdError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Envelope tag did not verify; nothing was decrypted.
    #[error("decryption failed: wrong key or corrupted artifact")]
    Authentication,

    /// Supplied verify key does not match the registry entry.
    #[error("access denied for artifact '{artifact}': verify key does not match")]
    AccessDenied { artifact: String },

    #[error("malformed artifact: {0}")]
    MalformedArtifact(String),

    #[error("operation not available in {0} mode")]
    WrongMode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QmdError {
    /// Wrap an `io::Error` with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QmdError::Io {
            path: path.into(),
            source,
        }
    }
}
