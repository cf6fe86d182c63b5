use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::Protection;

/// File name of the key registry when no explicit path is configured
pub const DEFAULT_REGISTRY_FILE: &str = "keys.json";

/// Top-level configuration (loaded from qmd.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QmdConfig {
    pub manifest: ManifestConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Artifact protection used by `create` and `edit` (default: encrypted)
    pub protection: Protection,
    /// Read buffer for fingerprinting, in KiB (default: 8)
    pub read_buffer_kib: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Explicit registry file. When unset, `keys.json` beside the artifact is used.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            protection: Protection::Encrypted,
            read_buffer_kib: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl ManifestConfig {
    /// Read buffer size in bytes, never zero.
    pub fn read_buffer_bytes(&self) -> usize {
        self.read_buffer_kib.max(1) * 1024
    }
}

impl RegistryConfig {
    /// Resolve the registry file used for a given artifact path.
    pub fn path_for(&self, artifact: &Path) -> PathBuf {
        if let Some(p) = &self.path {
            return p.clone();
        }
        match artifact.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(DEFAULT_REGISTRY_FILE),
            _ => PathBuf::from(DEFAULT_REGISTRY_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[manifest]
protection = "plain"
read_buffer_kib = 64

[registry]
path = "/var/lib/qmd/keys.json"

[logging]
level = "debug"
format = "json"
"#;
        let config: QmdConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.manifest.protection, Protection::Plain);
        assert_eq!(config.manifest.read_buffer_bytes(), 64 * 1024);
        assert_eq!(
            config.registry.path,
            Some(PathBuf::from("/var/lib/qmd/keys.json"))
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: QmdConfig = toml::from_str("").unwrap();

        assert_eq!(config.manifest.protection, Protection::Encrypted);
        assert_eq!(config.manifest.read_buffer_bytes(), 8192);
        assert!(config.registry.path.is_none());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_zero_buffer_clamped() {
        let config: QmdConfig = toml::from_str("[manifest]\nread_buffer_kib = 0\n").unwrap();
        assert_eq!(config.manifest.read_buffer_bytes(), 1024);
    }

    #[test]
    fn test_registry_beside_artifact() {
        let reg = RegistryConfig::default();
        assert_eq!(
            reg.path_for(Path::new("/data/sets/test.qmd")),
            PathBuf::from("/data/sets/keys.json")
        );
        assert_eq!(
            reg.path_for(Path::new("test.qmd")),
            PathBuf::from("keys.json")
        );
    }

    #[test]
    fn test_registry_explicit_path_wins() {
        let reg = RegistryConfig {
            path: Some(PathBuf::from("/etc/qmd/keys.json")),
        };
        assert_eq!(
            reg.path_for(Path::new("/data/test.qmd")),
            PathBuf::from("/etc/qmd/keys.json")
        );
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = QmdConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: QmdConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.manifest.protection, parsed.manifest.protection);
        assert_eq!(config.logging.level, parsed.logging.level);
    }
}
