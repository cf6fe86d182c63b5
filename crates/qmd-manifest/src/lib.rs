//! qmd-manifest: path → fingerprint manifests, their protection, and the key registry

pub mod atomic;
pub mod manifest;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod unpack;

pub use manifest::{build_manifest, Manifest, ManifestEntry, ProgressFn, Report};
pub use protocol::{
    artifact_id, is_protected, load_artifact, protect, read_artifact, save_artifact, unprotect,
    Credential, Protected,
};
pub use registry::{KeyRecord, KeyRegistry};
pub use session::{Mode, Session};
