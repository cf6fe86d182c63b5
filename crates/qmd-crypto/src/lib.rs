//! qmd-crypto: manifest sealing and artifact credentials
//!
//! A protected artifact is its JSON manifest sealed with AES-256-GCM:
//! ```text
//! KeyPair (minted per save)
//!   ├── VerifyKey  (256-bit random): compared against operator input, never a cipher key
//!   └── DecryptKey (256-bit random): AES-256-GCM key
//!         └── Envelope: nonce(16) ‖ tag(16) ‖ ciphertext, base64 on disk
//! ```

pub mod envelope;
pub mod error;
pub mod keys;

pub use envelope::{decode_base64, open, open_from_base64, seal, seal_to_base64};
pub use error::CryptoError;
pub use keys::{DecryptKey, KeyPair, VerifyKey};

/// Size of a key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an envelope nonce (128-bit)
pub const NONCE_SIZE: usize = 16;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
