//! Create / check / edit lifecycle.
//!
//! ```text
//! Idle ──create──▶ Creating ──save──▶ Idle
//! Idle ──check───▶ Checking ──close─▶ Idle
//! Idle ──edit────▶ Editing  ──save──▶ Idle   (fresh keys on every save)
//! ```
//!
//! Starting any mode discards the manifest currently held. Mutating tools are
//! only available while creating or editing.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use qmd_core::{Protection, QmdError, QmdResult};
use qmd_crypto::{DecryptKey, KeyPair, VerifyKey};

use crate::manifest::{Manifest, ProgressFn, Report};
use crate::protocol::{artifact_id, read_artifact, save_artifact, unprotect, Credential};
use crate::registry::KeyRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    Creating,
    Checking,
    Editing,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Idle => "idle",
            Mode::Creating => "create",
            Mode::Checking => "check",
            Mode::Editing => "edit",
        };
        f.write_str(s)
    }
}

/// One operator session: the current mode, the manifest it holds, and
/// where that manifest came from.
#[derive(Debug, Default)]
pub struct Session {
    mode: Mode,
    manifest: Manifest,
    source: Option<PathBuf>,
    template: Manifest,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disk settings (base dir, read buffer) applied to every manifest this
    /// session builds or loads.
    pub fn with_settings(mut self, template: Manifest) -> Self {
        self.template = template;
        self.manifest = Manifest::new().adopt_settings(&self.template);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Artifact the current manifest was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.manifest = Manifest::new().adopt_settings(&self.template);
        self.source = None;
    }

    /// Enter create mode with a manifest built from `paths`.
    pub fn create<I, S>(&mut self, paths: I, progress: Option<&ProgressFn>) -> QmdResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reset();
        let mut manifest = Manifest::new().adopt_settings(&self.template);
        manifest.extend_from_paths(paths, progress)?;

        info!(entries = manifest.len(), "create: manifest built");
        self.manifest = manifest;
        self.mode = Mode::Creating;
        Ok(())
    }

    /// Enter create mode with an already-captured manifest (e.g. a folder
    /// walk whose display paths differ from the on-disk paths).
    pub fn create_from(&mut self, manifest: Manifest) {
        self.reset();
        info!(entries = manifest.len(), "create: manifest captured");
        self.manifest = manifest.adopt_settings(&self.template);
        self.mode = Mode::Creating;
    }

    /// Check `artifact` against the disk.
    ///
    /// A protected artifact needs the verify key registered for it; without
    /// one (or with the wrong one) this fails with `AccessDenied` before any
    /// decryption. On failure the session is left idle and empty.
    pub fn check(
        &mut self,
        artifact: &Path,
        verify_key: Option<&VerifyKey>,
        registry: &KeyRegistry,
    ) -> QmdResult<Report> {
        self.reset();
        let bytes = read_artifact(artifact)?;
        self.check_bytes(artifact, &bytes, verify_key, registry)
    }

    /// [`check`](Self::check) on artifact content the caller already read.
    pub fn check_bytes(
        &mut self,
        artifact: &Path,
        bytes: &[u8],
        verify_key: Option<&VerifyKey>,
        registry: &KeyRegistry,
    ) -> QmdResult<Report> {
        self.reset();
        let id = artifact_id(artifact)?;
        let credential = verify_key.map_or(Credential::None, Credential::Verify);
        let manifest = unprotect(bytes, &id, credential, registry)?.adopt_settings(&self.template);

        let report = manifest.diff_against_disk();
        info!(
            artifact = %artifact.display(),
            entries = report.len(),
            matched = report.count(qmd_core::Status::Match),
            "check complete"
        );

        self.manifest = manifest;
        self.source = Some(artifact.to_path_buf());
        self.mode = Mode::Checking;
        Ok(report)
    }

    /// Open `artifact` for editing with the full decrypt key.
    ///
    /// The registry is not consulted. Plain artifacts need no key.
    pub fn edit(
        &mut self,
        artifact: &Path,
        decrypt_key: Option<&DecryptKey>,
        registry: &KeyRegistry,
    ) -> QmdResult<()> {
        self.reset();
        let bytes = read_artifact(artifact)?;
        self.edit_bytes(artifact, &bytes, decrypt_key, registry)
    }

    /// [`edit`](Self::edit) on artifact content the caller already read.
    pub fn edit_bytes(
        &mut self,
        artifact: &Path,
        bytes: &[u8],
        decrypt_key: Option<&DecryptKey>,
        registry: &KeyRegistry,
    ) -> QmdResult<()> {
        self.reset();
        let id = artifact_id(artifact)?;
        let credential = decrypt_key.map_or(Credential::None, Credential::Decrypt);
        let manifest = unprotect(bytes, &id, credential, registry)?.adopt_settings(&self.template);

        info!(artifact = %artifact.display(), entries = manifest.len(), "edit: manifest opened");
        self.manifest = manifest;
        self.source = Some(artifact.to_path_buf());
        self.mode = Mode::Editing;
        Ok(())
    }

    fn require_mutable(&self) -> QmdResult<()> {
        match self.mode {
            Mode::Creating | Mode::Editing => Ok(()),
            other => Err(QmdError::WrongMode(other.to_string())),
        }
    }

    pub fn add(&mut self, path: &str) -> QmdResult<bool> {
        self.require_mutable()?;
        self.manifest.add(path)
    }

    pub fn remove(&mut self, path: &str) -> QmdResult<Option<String>> {
        self.require_mutable()?;
        Ok(self.manifest.remove(path))
    }

    pub fn rename(&mut self, old: &str, new: &str) -> QmdResult<bool> {
        self.require_mutable()?;
        Ok(self.manifest.rename(old, new))
    }

    pub fn refresh(&mut self, path: &str) -> QmdResult<bool> {
        self.require_mutable()?;
        self.manifest.refresh(path)
    }

    pub fn refresh_all(&mut self) -> QmdResult<usize> {
        self.require_mutable()?;
        self.manifest.refresh_all()
    }

    /// Write the manifest to `artifact` and return to idle.
    ///
    /// Encrypted saves mint a new key pair every time and overwrite the
    /// registry entry for the artifact name, voiding earlier keys. The keys
    /// are returned once; they are not retrievable later except from the
    /// registry file. On failure the session keeps its mode and manifest.
    pub fn save(
        &mut self,
        artifact: &Path,
        protection: Protection,
        registry: &KeyRegistry,
    ) -> QmdResult<Option<KeyPair>> {
        self.require_mutable()?;
        let keys = save_artifact(&self.manifest, artifact, protection, registry)?;
        self.reset();
        Ok(keys)
    }

    /// Discard the current manifest without saving.
    pub fn close(&mut self) {
        self.reset();
    }
}
