//! Manifest model: ordered mapping of logical path → content fingerprint.
//!
//! Serialized as a flat JSON object (`{"path": "fingerprint", ...}`) with
//! insertion order preserved. Comparison between manifests ignores order.
//!
//! Paths are logical strings. Disk operations resolve them against the
//! manifest's base directory (empty by default, i.e. the working directory);
//! absolute paths are used as-is.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use qmd_core::{QmdError, QmdResult, Status};
use qmd_digest::DEFAULT_READ_BUFFER;

/// Progress callback type (files_done, files_total, current path)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// A single path → fingerprint pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    /// Lowercase hex MD5 (32 chars)
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    base_dir: PathBuf,
    read_buffer: usize,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            base_dir: PathBuf::new(),
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|e| other.get(&e.path) == Some(e.fingerprint.as_str()))
    }
}

impl Eq for Manifest {}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative entry paths against `dir` for disk operations.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Read buffer used when fingerprinting files.
    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes.max(1);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn read_buffer(&self) -> usize {
        self.read_buffer
    }

    /// Carry disk settings over from `other`, keeping this manifest's entries.
    pub(crate) fn adopt_settings(mut self, other: &Manifest) -> Self {
        self.base_dir = other.base_dir.clone();
        self.read_buffer = other.read_buffer;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.position(path)
            .map(|i| self.entries[i].fingerprint.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    fn disk_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    fn compute(&self, path: &str) -> QmdResult<String> {
        qmd_digest::fingerprint_with_buffer(&self.disk_path(path), self.read_buffer)
    }

    /// Insert or overwrite. An existing path keeps its position.
    pub fn insert(&mut self, path: impl Into<String>, fingerprint: impl Into<String>) {
        let path = path.into();
        let fingerprint = fingerprint.into();
        match self.position(&path) {
            Some(i) => self.entries[i].fingerprint = fingerprint,
            None => self.entries.push(ManifestEntry { path, fingerprint }),
        }
    }

    /// Fingerprint `path` and insert it. No-op if already present.
    ///
    /// Returns whether an entry was added.
    pub fn add(&mut self, path: &str) -> QmdResult<bool> {
        if self.contains(path) {
            debug!(path, "add: already present");
            return Ok(false);
        }
        let fingerprint = self.compute(path)?;
        self.entries.push(ManifestEntry {
            path: path.to_string(),
            fingerprint,
        });
        Ok(true)
    }

    /// Remove an entry, returning its fingerprint.
    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.position(path)
            .map(|i| self.entries.remove(i).fingerprint)
    }

    /// Move the fingerprint of `old` under `new`.
    ///
    /// No-op (returns false) if `old` is absent. An existing `new` entry is
    /// replaced.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if !self.contains(old) {
            debug!(old, new, "rename: source absent");
            return false;
        }
        if old == new {
            return true;
        }
        if let Some(j) = self.position(new) {
            self.entries.remove(j);
        }
        if let Some(i) = self.position(old) {
            self.entries[i].path = new.to_string();
        }
        true
    }

    /// Recompute the fingerprint of `path` if it exists on disk.
    ///
    /// Leaves the stored value untouched when the file is gone or the path is
    /// not in the manifest. Returns whether the entry was recomputed.
    pub fn refresh(&mut self, path: &str) -> QmdResult<bool> {
        let Some(i) = self.position(path) else {
            return Ok(false);
        };
        if !self.disk_path(path).exists() {
            debug!(path, "refresh: not on disk, keeping stored fingerprint");
            return Ok(false);
        }
        let fingerprint = self.compute(path)?;
        self.entries[i].fingerprint = fingerprint;
        Ok(true)
    }

    /// Refresh every entry. Returns how many were recomputed.
    pub fn refresh_all(&mut self) -> QmdResult<usize> {
        let paths: Vec<String> = self.entries.iter().map(|e| e.path.clone()).collect();
        let mut refreshed = 0;
        for path in &paths {
            if self.refresh(path)? {
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    /// Fingerprint and insert every path, overwriting existing entries.
    pub fn extend_from_paths<I, S>(&mut self, paths: I, progress: Option<&ProgressFn>) -> QmdResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths: Vec<S> = paths.into_iter().collect();
        let total = paths.len() as u64;
        for (done, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            if let Some(cb) = progress {
                cb(done as u64, total, path);
            }
            let fingerprint = self.compute(path)?;
            self.insert(path, fingerprint);
        }
        if let Some(cb) = progress {
            cb(total, total, "done");
        }
        Ok(())
    }

    /// Compare every entry against the file on disk.
    ///
    /// Missing if the path does not exist, Mismatch if it exists but its
    /// fingerprint differs (or it cannot be read), Match otherwise.
    pub fn diff_against_disk(&self) -> Report {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let disk = self.disk_path(&entry.path);
                let status = if !disk.exists() {
                    Status::Missing
                } else {
                    match self.compute(&entry.path) {
                        Ok(fp) if fp == entry.fingerprint => Status::Match,
                        Ok(_) => Status::Mismatch,
                        Err(e) => {
                            warn!(path = %entry.path, "cannot fingerprint: {e}");
                            Status::Mismatch
                        }
                    }
                };
                (entry.path.clone(), status)
            })
            .collect();
        Report { entries }
    }

    /// Serialize to the artifact JSON form (4-space indented object).
    pub fn to_json_bytes(&self) -> QmdResult<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)
            .map_err(|e| QmdError::Other(anyhow::anyhow!("serializing manifest: {e}")))?;
        Ok(out)
    }

    /// Parse the artifact JSON form. Duplicate keys: last write wins.
    pub fn from_json_bytes(data: &[u8]) -> QmdResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| QmdError::MalformedArtifact(format!("manifest JSON: {e}")))
    }
}

/// Build a manifest by fingerprinting each path (working-directory relative).
pub fn build_manifest<I, S>(paths: I) -> QmdResult<Manifest>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut manifest = Manifest::new();
    manifest.extend_from_paths(paths, None)?;
    Ok(manifest)
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.path, &entry.fingerprint)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ManifestVisitor)
    }
}

struct ManifestVisitor;

impl<'de> Visitor<'de> for ManifestVisitor {
    type Value = Manifest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping path to 32-char hex fingerprint")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Manifest, A::Error> {
        let mut manifest = Manifest::new();
        while let Some((path, fingerprint)) = access.next_entry::<String, String>()? {
            let fingerprint = fingerprint.to_ascii_lowercase();
            if !qmd_digest::is_fingerprint(&fingerprint) {
                return Err(serde::de::Error::custom(format!(
                    "invalid fingerprint for '{path}': '{fingerprint}'"
                )));
            }
            manifest.insert(path, fingerprint);
        }
        Ok(manifest)
    }
}

/// Per-entry result of [`Manifest::diff_against_disk`], in manifest order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub entries: Vec<(String, Status)>,
}

impl Report {
    pub fn status(&self, path: &str) -> Option<Status> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, s)| *s)
    }

    pub fn count(&self, status: Status) -> usize {
        self.entries.iter().filter(|(_, s)| *s == status).count()
    }

    pub fn all_match(&self) -> bool {
        self.entries.iter().all(|(_, s)| s.is_match())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
