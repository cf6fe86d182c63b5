//! Artifact credentials: verify key, decrypt key, and the pair registered per artifact
//!
//! The two key types are distinct: a `VerifyKey` only gates the
//! check path and never reaches the cipher, while a `DecryptKey` is the cipher
//! key itself. Neither converts into the other.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::KEY_SIZE;

macro_rules! secret_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }

            /// Generate a random 256-bit key.
            pub fn generate() -> Self {
                let mut bytes = [0u8; KEY_SIZE];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self { bytes }
            }

            /// Standard padded base64, the storage and display form.
            pub fn to_base64(&self) -> String {
                STANDARD.encode(&self.bytes)
            }

            /// Parse a base64 key; must decode to exactly 32 bytes.
            pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
                let mut decoded = STANDARD
                    .decode(s.trim())
                    .map_err(|e| CryptoError::InvalidKey(format!("base64 decode: {e}")))?;

                if decoded.len() != KEY_SIZE {
                    let len = decoded.len();
                    decoded.zeroize();
                    return Err(CryptoError::InvalidKey(format!(
                        "key has wrong size: {len} bytes (expected {KEY_SIZE})"
                    )));
                }

                let mut bytes = [0u8; KEY_SIZE];
                bytes.copy_from_slice(&decoded);
                decoded.zeroize();
                Ok(Self { bytes })
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_key!(
    /// Lesser credential: permits checking an artifact, never decryption.
    VerifyKey
);

secret_key!(
    /// Full credential: the AES-256-GCM key an artifact is sealed under.
    DecryptKey
);

impl VerifyKey {
    /// Constant-time comparison against a candidate supplied by the operator.
    pub fn matches(&self, candidate: &VerifyKey) -> bool {
        bool::from(self.bytes[..].ct_eq(&candidate.bytes[..]))
    }
}

/// The credentials minted for one artifact save.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub verify: VerifyKey,
    pub decrypt: DecryptKey,
}

impl KeyPair {
    /// Generate a fresh pair with distinct verify and decrypt keys.
    pub fn generate() -> Self {
        let decrypt = DecryptKey::generate();
        let mut verify = VerifyKey::generate();
        while verify.as_bytes() == decrypt.as_bytes() {
            verify = VerifyKey::generate();
        }
        Self { verify, decrypt }
    }
}
