//! MD5 content fingerprints for files and byte slices
//!
//! Files are streamed through a fixed-size read buffer, so memory use does
//! not grow with file size. Only file bytes enter the digest: two files with
//! identical content always fingerprint identically.

use ::md5::{Digest, Md5};
use std::io::Read;
use std::path::Path;

use qmd_core::{QmdError, QmdResult};

/// Length of a fingerprint in hex chars (128-bit digest)
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// Default read buffer for streaming (8 KiB)
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Fingerprint a byte slice in memory.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Fingerprint a file from disk with the default read buffer.
pub fn fingerprint(path: &Path) -> QmdResult<String> {
    fingerprint_with_buffer(path, DEFAULT_READ_BUFFER)
}

/// Fingerprint a file from disk, reading `buf_size` bytes at a time.
pub fn fingerprint_with_buffer(path: &Path, buf_size: usize) -> QmdResult<String> {
    let file = std::fs::File::open(path).map_err(|e| QmdError::io(path, e))?;
    let fp = fingerprint_reader(file, buf_size).map_err(|e| QmdError::io(path, e))?;
    tracing::debug!(path = %path.display(), fingerprint = %fp, "fingerprinted");
    Ok(fp)
}

/// Fingerprint everything readable from `reader`.
pub fn fingerprint_reader<R: Read>(mut reader: R, buf_size: usize) -> std::io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; buf_size.max(1)];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// True if `s` is a well-formed fingerprint: 32 lowercase hex chars.
pub fn is_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_HEX_LEN
        && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn empty_fingerprint_is_well_known() {
        assert_eq!(fingerprint_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn file_and_slice_agree() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello qmd").unwrap();
        tmp.flush().unwrap();

        let from_file = fingerprint(tmp.path()).unwrap();
        assert_eq!(from_file, fingerprint_bytes(b"hello qmd"));
        assert!(is_fingerprint(&from_file));
    }

    #[test]
    fn tiny_buffer_matches_default() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let small = fingerprint_with_buffer(tmp.path(), 7).unwrap();
        let default = fingerprint(tmp.path()).unwrap();
        assert_eq!(small, default);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = fingerprint(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, QmdError::Io { .. }));
    }

    #[test]
    fn name_does_not_enter_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("other-name.bin");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn rejects_malformed_fingerprints() {
        assert!(!is_fingerprint("D41D8CD98F00B204E9800998ECF8427E"));
        assert!(!is_fingerprint("d41d8cd9"));
        assert!(!is_fingerprint("zz1d8cd98f00b204e9800998ecf8427e"));
    }

    proptest! {
        #[test]
        fn fingerprint_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..=4096)) {
            let f1 = fingerprint_bytes(&data);
            let f2 = fingerprint_bytes(&data);
            prop_assert_eq!(&f1, &f2);
            prop_assert!(is_fingerprint(&f1));
        }

        #[test]
        fn reader_matches_slice(data in proptest::collection::vec(any::<u8>(), 0..=4096), buf in 1usize..=512) {
            let streamed = fingerprint_reader(&data[..], buf).unwrap();
            prop_assert_eq!(streamed, fingerprint_bytes(&data));
        }
    }
}
