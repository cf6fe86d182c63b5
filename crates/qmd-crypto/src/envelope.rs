//! AES-256-GCM sealed envelopes
//!
//! Envelope format (binary):
//! ```text
//! [16 bytes: random nonce][16 bytes: GCM tag][N bytes: ciphertext]
//! ```
//!
//! On disk the envelope is stored as standard padded base64. The layout is
//! fixed; existing artifacts depend on it byte for byte.

use aes_gcm::{
    aead::{consts::U16, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm, Nonce, Tag,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::DecryptKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// AES-256-GCM with a 128-bit nonce and 128-bit tag.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Seal `plaintext` under `key`.
///
/// A fresh random nonce is drawn for every call.
/// Returns: `[16-byte nonce][16-byte tag][ciphertext]`
pub fn seal(plaintext: &[u8], key: &DecryptKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm16::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(nonce, b"", &mut buffer)
        .map_err(|e| CryptoError::Seal(e.to_string()))?;

    let mut envelope = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + buffer.len());
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&tag);
    envelope.extend_from_slice(&buffer);
    Ok(envelope)
}

/// Open an envelope produced by [`seal`].
///
/// Fails with [`CryptoError::Authentication`] unless the tag verifies against
/// `key` and the exact nonce/ciphertext pair. No plaintext escapes on failure.
pub fn open(envelope: &[u8], key: &DecryptKey) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < NONCE_SIZE + TAG_SIZE {
        tracing::debug!(len = envelope.len(), "envelope shorter than nonce + tag");
        return Err(CryptoError::Authentication);
    }

    let (nonce_bytes, rest) = envelope.split_at(NONCE_SIZE);
    let (tag_bytes, ciphertext) = rest.split_at(TAG_SIZE);
    let nonce = Nonce::<U16>::from_slice(nonce_bytes);
    let tag = Tag::<U16>::from_slice(tag_bytes);
    let cipher = Aes256Gcm16::new(key.as_bytes().into());

    let mut buffer = ciphertext.to_vec();
    match cipher.decrypt_in_place_detached(nonce, b"", &mut buffer, tag) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(CryptoError::Authentication)
        }
    }
}

/// Seal and encode as base64 text (the on-disk artifact form).
pub fn seal_to_base64(plaintext: &[u8], key: &DecryptKey) -> Result<String, CryptoError> {
    Ok(STANDARD.encode(seal(plaintext, key)?))
}

/// Decode the base64 artifact form back into envelope bytes.
/// Surrounding whitespace is ignored.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| CryptoError::MalformedEnvelope(format!("base64 decode: {e}")))
}

/// Decode base64 text and open the envelope.
pub fn open_from_base64(text: &str, key: &DecryptKey) -> Result<Vec<u8>, CryptoError> {
    open(&decode_base64(text)?, key)
}
