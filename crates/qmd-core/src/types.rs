use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of comparing a manifest entry against the file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// File exists and its fingerprint equals the stored one
    Match,
    /// File exists but its content changed (or could not be read)
    Mismatch,
    /// File does not exist
    Missing,
}

impl Status {
    pub fn is_match(self) -> bool {
        self == Status::Match
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Match => "OK",
            Status::Mismatch => "FAIL",
            Status::Missing => "MISSING",
        };
        f.write_str(s)
    }
}

/// How an artifact is written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protection {
    /// Plain JSON object, no key material
    Plain,
    /// Sealed envelope, keys registered per artifact
    #[default]
    Encrypted,
}
