//! Write-then-rename file replacement.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use qmd_core::{QmdError, QmdResult};

/// Content staged in a sibling temp file, moved into place by [`commit`].
///
/// Dropping an uncommitted write removes the temp file, leaving the
/// destination untouched.
///
/// [`commit`]: PendingWrite::commit
#[derive(Debug)]
pub struct PendingWrite {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl PendingWrite {
    /// Stage `data` for `dest` in `<dest>.tmp`.
    pub fn stage(dest: &Path, data: &[u8]) -> QmdResult<Self> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| QmdError::io(parent, e))?;
            }
        }

        let tmp = tmp_path(dest);
        std::fs::write(&tmp, data).map_err(|e| QmdError::io(&tmp, e))?;
        Ok(Self {
            tmp,
            dest: dest.to_path_buf(),
            committed: false,
        })
    }

    pub fn commit(mut self) -> QmdResult<()> {
        std::fs::rename(&self.tmp, &self.dest).map_err(|e| QmdError::io(&self.dest, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.tmp) {
                tracing::debug!("failed to remove {}: {e}", self.tmp.display());
            }
        }
    }
}

/// Replace `dest` with `data` in one step.
pub fn write_atomic(dest: &Path, data: &[u8]) -> QmdResult<()> {
    PendingWrite::stage(dest, data)?.commit()
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("qmd"));
    name.push(".tmp");
    dest.with_file_name(name)
}
