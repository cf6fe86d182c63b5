//! qmd-digest: streaming content fingerprints
//!
//! A fingerprint is the lowercase hex MD5 of a file's full byte content.

pub mod md5;

pub use crate::md5::{
    fingerprint, fingerprint_bytes, fingerprint_reader, fingerprint_with_buffer, is_fingerprint,
    DEFAULT_READ_BUFFER, FINGERPRINT_HEX_LEN,
};
