use thiserror::Error;

use qmd_core::QmdError;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Tag verification failed; no plaintext was produced.
    #[error("envelope authentication failed")]
    Authentication,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("sealing failed: {0}")]
    Seal(String),
}

impl From<CryptoError> for QmdError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Authentication => QmdError::Authentication,
            CryptoError::MalformedEnvelope(msg) => QmdError::MalformedArtifact(msg),
            other => QmdError::Other(anyhow::Error::new(other)),
        }
    }
}
