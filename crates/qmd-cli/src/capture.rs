//! Folder capture: walk a directory and choose how each path is recorded.
//!
//! The display policy only shapes the logical path stored in the manifest at
//! capture time. Fingerprints always come from the real file.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use qmd_manifest::Manifest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PathDisplay {
    /// Full absolute path
    Absolute,
    /// Path relative to the captured folder
    Relative,
    /// File name only
    Name,
}

/// Logical path for `path` (found under `root`) according to `policy`.
pub fn display_path(path: &Path, root: &Path, policy: PathDisplay) -> String {
    let shown = match policy {
        PathDisplay::Absolute => path.to_path_buf(),
        PathDisplay::Relative => path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf()),
        PathDisplay::Name => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf()),
    };
    shown.to_string_lossy().into_owned()
}

/// Regular files under `root`, sorted, with `root` made absolute.
pub fn walk_folder(root: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("resolving folder: {}", root.display()))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok((root, files))
}

/// Fingerprint every file under `root`, recording it under its display path.
///
/// With [`PathDisplay::Name`] two files sharing a name collide; the later one
/// in walk order wins.
pub fn capture_folder(
    root: &Path,
    policy: PathDisplay,
    read_buffer: usize,
    progress: Option<&qmd_manifest::ProgressFn>,
) -> Result<Manifest> {
    let (root, files) = walk_folder(root)?;
    let total = files.len() as u64;
    let mut manifest = Manifest::new().with_read_buffer(read_buffer);

    for (done, file) in files.iter().enumerate() {
        let logical = display_path(file, &root, policy);
        if let Some(cb) = progress {
            cb(done as u64, total, &logical);
        }
        let fingerprint = qmd_digest::fingerprint_with_buffer(file, read_buffer)?;
        if manifest.contains(&logical) {
            tracing::warn!(path = %logical, "display path collision, keeping later file");
        }
        manifest.insert(logical, fingerprint);
    }
    if let Some(cb) = progress {
        cb(total, total, "done");
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_policies() {
        let root = Path::new("/data/set");
        let file = Path::new("/data/set/sub/a.txt");

        assert_eq!(
            display_path(file, root, PathDisplay::Absolute),
            "/data/set/sub/a.txt"
        );
        assert_eq!(display_path(file, root, PathDisplay::Relative), "sub/a.txt");
        assert_eq!(display_path(file, root, PathDisplay::Name), "a.txt");
    }

    #[test]
    fn test_relative_outside_root_falls_back() {
        let shown = display_path(
            Path::new("/elsewhere/b.txt"),
            Path::new("/data/set"),
            PathDisplay::Relative,
        );
        assert_eq!(shown, "/elsewhere/b.txt");
    }

    #[test]
    fn test_capture_folder_relative() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("top.txt"), b"").unwrap();
        std::fs::write(tmp.path().join("sub/inner.txt"), b"inner").unwrap();

        let m = capture_folder(tmp.path(), PathDisplay::Relative, 8192, None).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("top.txt"), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(
            m.get(&Path::new("sub").join("inner.txt").to_string_lossy()),
            Some(qmd_digest::fingerprint_bytes(b"inner").as_str())
        );
    }

    #[test]
    fn test_capture_folder_name_collision_last_wins() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("x")).unwrap();
        std::fs::create_dir(tmp.path().join("y")).unwrap();
        std::fs::write(tmp.path().join("x/same.txt"), b"first").unwrap();
        std::fs::write(tmp.path().join("y/same.txt"), b"second").unwrap();

        let m = capture_folder(tmp.path(), PathDisplay::Name, 8192, None).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(
            m.get("same.txt"),
            Some(qmd_digest::fingerprint_bytes(b"second").as_str())
        );
    }
}
