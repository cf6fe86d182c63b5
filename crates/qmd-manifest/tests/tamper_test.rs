//! Tampered artifacts must fail closed: no manifest comes back.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;
use qmd_core::{Protection, QmdError};
use qmd_manifest::{protect, unprotect, Credential, KeyRegistry, Manifest};

fn sample(n: usize) -> Manifest {
    let mut m = Manifest::new();
    for i in 0..n {
        m.insert(format!("dir/file-{i}.bin"), qmd_digest::fingerprint_bytes(&[i as u8]));
    }
    m
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_bit_flip_is_rejected(entries in 1usize..8, pick in any::<prop::sample::Index>(), bit in 0u8..8) {
        let tmp = tempfile::tempdir().unwrap();
        let registry = KeyRegistry::new(tmp.path().join("keys.json"));

        let manifest = sample(entries);
        let protected = protect(&manifest, Protection::Encrypted).unwrap();
        let keys = protected.keys.unwrap();

        let mut envelope = STANDARD.decode(&protected.artifact).unwrap();
        let at = pick.index(envelope.len());
        envelope[at] ^= 1 << bit;
        let tampered = STANDARD.encode(&envelope);

        let result = unprotect(tampered.as_bytes(), "t.qmd", Credential::Decrypt(&keys.decrypt), &registry);
        prop_assert!(matches!(result, Err(QmdError::Authentication)));
    }

    #[test]
    fn protected_roundtrip(entries in 0usize..16) {
        let tmp = tempfile::tempdir().unwrap();
        let registry = KeyRegistry::new(tmp.path().join("keys.json"));

        let manifest = sample(entries);
        let protected = protect(&manifest, Protection::Encrypted).unwrap();
        let keys = protected.keys.unwrap();

        let back = unprotect(&protected.artifact, "t.qmd", Credential::Decrypt(&keys.decrypt), &registry).unwrap();
        prop_assert_eq!(back, manifest);
    }
}

#[test]
fn swapped_artifact_content_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = KeyRegistry::new(tmp.path().join("keys.json"));

    let first = protect(&sample(2), Protection::Encrypted).unwrap();
    let second = protect(&sample(3), Protection::Encrypted).unwrap();
    let first_keys = first.keys.unwrap();

    // a foreign envelope presented under another artifact's keys
    let result = unprotect(
        &second.artifact,
        "t.qmd",
        Credential::Decrypt(&first_keys.decrypt),
        &registry,
    );
    assert!(matches!(result, Err(QmdError::Authentication)));
}
