//! Key registry: artifact id (basename) → verify/decrypt key pair.
//!
//! Persisted as a JSON object in `keys.json`:
//! ```json
//! { "test.qmd": { "verify_key": "<base64>", "decrypt_key": "<base64>" } }
//! ```
//!
//! Reads are tolerant: a missing or corrupt file is an empty registry.
//! Registration is one read-modify-write cycle held under an exclusive
//! advisory lock on `keys.json.lock` and finished with an atomic write
//! (temp + rename). A second update attempted while the lock is held fails
//! instead of waiting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use qmd_core::{QmdError, QmdResult};
use qmd_crypto::{DecryptKey, KeyPair, VerifyKey};

use crate::atomic::write_atomic;

/// Stored credentials for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub verify_key: String,
    pub decrypt_key: String,
}

impl From<&KeyPair> for KeyRecord {
    fn from(pair: &KeyPair) -> Self {
        Self {
            verify_key: pair.verify.to_base64(),
            decrypt_key: pair.decrypt.to_base64(),
        }
    }
}

type Entries = BTreeMap<String, KeyRecord>;

#[derive(Debug, Clone)]
pub struct KeyRegistry {
    path: PathBuf,
}

impl KeyRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or overwrite the key pair for `artifact_id`.
    pub fn register(&self, artifact_id: &str, pair: &KeyPair) -> QmdResult<()> {
        let _lock = RegistryLock::acquire(&self.path)?;

        let mut entries = self.load()?;
        let replaced = entries
            .insert(artifact_id.to_string(), KeyRecord::from(pair))
            .is_some();

        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|e| QmdError::Other(anyhow::anyhow!("serializing registry: {e}")))?;
        write_atomic(&self.path, &json)?;

        info!(
            artifact = artifact_id,
            replaced,
            registry = %self.path.display(),
            "registered artifact keys"
        );
        Ok(())
    }

    pub fn lookup_verify_key(&self, artifact_id: &str) -> QmdResult<VerifyKey> {
        let record = self.record(artifact_id)?;
        VerifyKey::from_base64(&record.verify_key).map_err(|e| {
            warn!(artifact = artifact_id, "unusable verify key in registry: {e}");
            QmdError::NotFound(format!("verify key for '{artifact_id}'"))
        })
    }

    pub fn lookup_decrypt_key(&self, artifact_id: &str) -> QmdResult<DecryptKey> {
        let record = self.record(artifact_id)?;
        DecryptKey::from_base64(&record.decrypt_key).map_err(|e| {
            warn!(artifact = artifact_id, "unusable decrypt key in registry: {e}");
            QmdError::NotFound(format!("decrypt key for '{artifact_id}'"))
        })
    }

    pub fn contains(&self, artifact_id: &str) -> QmdResult<bool> {
        Ok(self.load()?.contains_key(artifact_id))
    }

    /// Registered artifact ids, sorted.
    pub fn artifact_ids(&self) -> QmdResult<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }

    fn record(&self, artifact_id: &str) -> QmdResult<KeyRecord> {
        self.load()?
            .remove(artifact_id)
            .ok_or_else(|| QmdError::NotFound(format!("registry entry for '{artifact_id}'")))
    }

    /// Read the registry file. Missing ⇒ empty; unparseable ⇒ empty with a warning.
    fn load(&self) -> QmdResult<Entries> {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(registry = %self.path.display(), "registry absent, starting empty");
                return Ok(Entries::new());
            }
            Err(e) => return Err(QmdError::io(&self.path, e)),
        };

        match serde_json::from_slice(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(
                    registry = %self.path.display(),
                    "registry corrupt, treating as empty: {e}"
                );
                Ok(Entries::new())
            }
        }
    }
}

/// Exclusive advisory lock on `<registry>.lock`.
///
/// The lock file itself is left in place; only the `flock` matters, and the
/// kernel drops it when the holder exits, so a crashed update never wedges
/// later saves.
struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    fn acquire(registry: &Path) -> QmdResult<Self> {
        let path = lock_path(registry);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| QmdError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| QmdError::io(&path, e))?;

        match try_flock_exclusive(&file) {
            Ok(true) => Ok(Self { _file: file }),
            Ok(false) => Err(QmdError::io(
                &path,
                io::Error::new(
                    ErrorKind::WouldBlock,
                    "registry is locked by another update in progress",
                ),
            )),
            Err(e) => Err(QmdError::io(&path, e)),
        }
    }
}

fn lock_path(registry: &Path) -> PathBuf {
    let mut name = registry
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("keys"));
    name.push(".lock");
    registry.with_file_name(name)
}

/// Try to take an exclusive `flock` without blocking.
///
/// Returns `Ok(false)` if another open file description holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, KeyRegistry) {
        let tmp = TempDir::new().unwrap();
        let reg = KeyRegistry::new(tmp.path().join("keys.json"));
        (tmp, reg)
    }

    #[test]
    fn test_register_and_lookup() {
        let (_tmp, reg) = registry();
        let pair = KeyPair::generate();
        reg.register("test.qmd", &pair).unwrap();

        let verify = reg.lookup_verify_key("test.qmd").unwrap();
        let decrypt = reg.lookup_decrypt_key("test.qmd").unwrap();
        assert!(verify.matches(&pair.verify));
        assert_eq!(decrypt.as_bytes(), pair.decrypt.as_bytes());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_tmp, reg) = registry();
        assert!(!reg.contains("test.qmd").unwrap());
        assert!(matches!(
            reg.lookup_verify_key("test.qmd"),
            Err(QmdError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_overwrites() {
        let (_tmp, reg) = registry();
        let first = KeyPair::generate();
        let second = KeyPair::generate();
        reg.register("test.qmd", &first).unwrap();
        reg.register("test.qmd", &second).unwrap();

        let verify = reg.lookup_verify_key("test.qmd").unwrap();
        assert!(verify.matches(&second.verify));
        assert!(!verify.matches(&first.verify));
        assert_eq!(reg.artifact_ids().unwrap(), vec!["test.qmd".to_string()]);
    }

    #[test]
    fn test_register_merges_entries() {
        let (_tmp, reg) = registry();
        reg.register("a.qmd", &KeyPair::generate()).unwrap();
        reg.register("b.qmd", &KeyPair::generate()).unwrap();
        assert_eq!(
            reg.artifact_ids().unwrap(),
            vec!["a.qmd".to_string(), "b.qmd".to_string()]
        );
    }

    #[test]
    fn test_corrupt_registry_recovered_on_register() {
        let (tmp, reg) = registry();
        std::fs::write(tmp.path().join("keys.json"), b"{ not json").unwrap();

        assert!(!reg.contains("x.qmd").unwrap());
        reg.register("x.qmd", &KeyPair::generate()).unwrap();
        assert!(reg.contains("x.qmd").unwrap());
    }

    #[test]
    fn test_file_format() {
        let (tmp, reg) = registry();
        let pair = KeyPair::generate();
        reg.register("test.qmd", &pair).unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("keys.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["test.qmd"]["verify_key"], pair.verify.to_base64());
        assert_eq!(value["test.qmd"]["decrypt_key"], pair.decrypt.to_base64());
    }

    #[test]
    fn test_lock_released_after_register() {
        let (tmp, reg) = registry();
        reg.register("test.qmd", &KeyPair::generate()).unwrap();
        assert!(tmp.path().join("keys.json.lock").exists());

        let again = RegistryLock::acquire(reg.path()).unwrap();
        drop(again);
    }

    #[test]
    fn test_leftover_lock_file_does_not_block() {
        let (tmp, reg) = registry();
        // an update that died mid-cycle leaves the file, but not the lock
        std::fs::write(tmp.path().join("keys.json.lock"), b"").unwrap();

        reg.register("a.qmd", &KeyPair::generate()).unwrap();
        reg.register("b.qmd", &KeyPair::generate()).unwrap();
        assert_eq!(reg.artifact_ids().unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_held_lock_blocks_register() {
        let (tmp, reg) = registry();
        let held = RegistryLock::acquire(reg.path()).unwrap();

        let result = reg.register("test.qmd", &KeyPair::generate());
        assert!(matches!(result, Err(QmdError::Io { .. })));
        assert!(!tmp.path().join("keys.json").exists());

        drop(held);
        reg.register("test.qmd", &KeyPair::generate()).unwrap();
        assert!(reg.contains("test.qmd").unwrap());
    }

    #[test]
    fn test_bad_key_material_is_not_found() {
        let (tmp, reg) = registry();
        std::fs::write(
            tmp.path().join("keys.json"),
            br#"{"test.qmd": {"verify_key": "short", "decrypt_key": "short"}}"#,
        )
        .unwrap();
        assert!(matches!(
            reg.lookup_decrypt_key("test.qmd"),
            Err(QmdError::NotFound(_))
        ));
    }
}
