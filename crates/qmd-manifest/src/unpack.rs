//! `.qmdu` export: one `path:fingerprint` line per entry. Write-only.

use std::path::{Path, PathBuf};
use tracing::info;

use qmd_core::QmdResult;

use crate::atomic::write_atomic;
use crate::manifest::Manifest;
use crate::protocol::{artifact_id, read_artifact, unprotect, Credential};
use crate::registry::KeyRegistry;

pub const UNPACK_EXTENSION: &str = "qmdu";

pub fn render(manifest: &Manifest) -> String {
    manifest
        .iter()
        .map(|e| format!("{}:{}\n", e.path, e.fingerprint))
        .collect()
}

/// Where the export for `artifact` is written: same stem, `.qmdu` extension.
pub fn unpack_path(artifact: &Path) -> PathBuf {
    artifact.with_extension(UNPACK_EXTENSION)
}

/// Open `artifact` and write its entries next to it. Returns the export path.
pub fn unpack(
    artifact: &Path,
    credential: Credential<'_>,
    registry: &KeyRegistry,
) -> QmdResult<PathBuf> {
    let bytes = read_artifact(artifact)?;
    unpack_bytes(artifact, &bytes, credential, registry)
}

/// [`unpack`] on artifact content the caller already read.
pub fn unpack_bytes(
    artifact: &Path,
    bytes: &[u8],
    credential: Credential<'_>,
    registry: &KeyRegistry,
) -> QmdResult<PathBuf> {
    let manifest = unprotect(bytes, &artifact_id(artifact)?, credential, registry)?;
    let out = unpack_path(artifact);
    write_atomic(&out, render(&manifest).as_bytes())?;
    info!(artifact = %artifact.display(), out = %out.display(), "unpacked");
    Ok(out)
}
