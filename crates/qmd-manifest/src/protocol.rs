//! Manifest protection: turning a manifest into artifact bytes and back.
//!
//! Artifact forms:
//!   - plain:     the manifest JSON object
//!   - protected: base64 of `nonce(16) ‖ tag(16) ‖ AES-256-GCM(manifest JSON)`
//!
//! The form is detected on read: a leading `{` (after whitespace) means plain.
//!
//! Access to a protected artifact takes one of two credentials. A verify key
//! is checked against the registry before anything is decrypted; the
//! registered decrypt key then opens the envelope. A decrypt key opens the
//! envelope directly and bypasses the registry.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use qmd_core::{Protection, QmdError, QmdResult};
use qmd_crypto::{DecryptKey, KeyPair, VerifyKey};

use crate::atomic::PendingWrite;
use crate::manifest::Manifest;
use crate::registry::KeyRegistry;

/// Credential presented to open an artifact
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    /// No key material (plain artifacts only)
    None,
    /// Lesser credential, checked against the registry
    Verify(&'a VerifyKey),
    /// Full credential, used as the cipher key
    Decrypt(&'a DecryptKey),
}

/// Output of [`protect`]
#[derive(Debug)]
pub struct Protected {
    /// Bytes to write to the artifact file
    pub artifact: Vec<u8>,
    /// Freshly minted keys; `None` for plain artifacts
    pub keys: Option<KeyPair>,
}

/// Serialize `manifest`, sealing it under a fresh key pair when encrypted.
pub fn protect(manifest: &Manifest, protection: Protection) -> QmdResult<Protected> {
    let json = manifest.to_json_bytes()?;
    match protection {
        Protection::Plain => Ok(Protected {
            artifact: json,
            keys: None,
        }),
        Protection::Encrypted => {
            let keys = KeyPair::generate();
            let text = qmd_crypto::seal_to_base64(&json, &keys.decrypt)?;
            Ok(Protected {
                artifact: text.into_bytes(),
                keys: Some(keys),
            })
        }
    }
}

/// Recover the manifest from artifact bytes.
///
/// Fails with `AccessDenied` when a protected artifact is presented without a
/// credential, or with a verify key that is unregistered or does not match.
/// In that case nothing is decrypted.
pub fn unprotect(
    artifact: &[u8],
    artifact_id: &str,
    credential: Credential<'_>,
    registry: &KeyRegistry,
) -> QmdResult<Manifest> {
    let artifact = strip_bom(artifact);
    if !is_protected(artifact) {
        debug!(artifact = artifact_id, "plain artifact, no key material needed");
        return Manifest::from_json_bytes(artifact);
    }

    // shape first: a damaged file is malformed whatever credential is offered
    let text = std::str::from_utf8(artifact)
        .map_err(|e| QmdError::MalformedArtifact(format!("envelope is not UTF-8 text: {e}")))?;
    let envelope = qmd_crypto::decode_base64(text)?;

    let denied = || QmdError::AccessDenied {
        artifact: artifact_id.to_string(),
    };

    let plaintext = match credential {
        Credential::None => return Err(denied()),
        Credential::Verify(candidate) => {
            let registered = registry.lookup_verify_key(artifact_id).map_err(|e| match e {
                QmdError::NotFound(_) => denied(),
                other => other,
            })?;
            if !registered.matches(candidate) {
                info!(artifact = artifact_id, "verify key rejected");
                return Err(denied());
            }
            let key = registry.lookup_decrypt_key(artifact_id).map_err(|e| match e {
                QmdError::NotFound(_) => denied(),
                other => other,
            })?;
            qmd_crypto::open(&envelope, &key)?
        }
        Credential::Decrypt(key) => qmd_crypto::open(&envelope, key)?,
    };

    Manifest::from_json_bytes(&plaintext)
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// True unless the artifact looks like a plain JSON object (a leading UTF-8
/// BOM and whitespace are skipped).
pub fn is_protected(artifact: &[u8]) -> bool {
    strip_bom(artifact)
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map_or(true, |&b| b != b'{')
}

/// Registry key for an artifact: its file name.
pub fn artifact_id(path: &Path) -> QmdResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| QmdError::Config(format!("artifact path has no file name: {}", path.display())))
}

pub fn read_artifact(path: &Path) -> QmdResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| QmdError::io(path, e))
}

/// Protect `manifest` and write it to `path`.
///
/// For encrypted artifacts the keys are registered under the file name before
/// the artifact replaces any previous file, so a failed registration leaves
/// both the old artifact and the registry as they were. Returns the new keys.
pub fn save_artifact(
    manifest: &Manifest,
    path: &Path,
    protection: Protection,
    registry: &KeyRegistry,
) -> QmdResult<Option<KeyPair>> {
    let id = artifact_id(path)?;
    if same_location(path, registry.path()) {
        return Err(QmdError::Config(format!(
            "artifact {} would overwrite the key registry",
            path.display()
        )));
    }
    let protected = protect(manifest, protection)?;

    let pending = PendingWrite::stage(path, &protected.artifact)?;
    if let Some(keys) = &protected.keys {
        registry.register(&id, keys)?;
    }
    pending.commit()?;

    info!(
        artifact = %path.display(),
        entries = manifest.len(),
        ?protection,
        "artifact saved"
    );
    Ok(protected.keys)
}

/// True if `a` and `b` name the same file, resolving the parent directories
/// when they exist.
fn same_location(a: &Path, b: &Path) -> bool {
    fn dir_of(p: &Path) -> PathBuf {
        let parent = p
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf())
    }
    a.file_name() == b.file_name() && dir_of(a) == dir_of(b)
}

/// Read and unprotect the artifact at `path`.
pub fn load_artifact(
    path: &Path,
    credential: Credential<'_>,
    registry: &KeyRegistry,
) -> QmdResult<Manifest> {
    let id = artifact_id(path)?;
    let bytes = read_artifact(path)?;
    unprotect(&bytes, &id, credential, registry)
}
