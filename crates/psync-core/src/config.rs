use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PsyncError, PsyncResult};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PsyncConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub crypt: CryptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info). RUST_LOG takes precedence.
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3 endpoint; empty uses the AWS endpoint for `region`
    pub endpoint: String,
    /// S3 region (default: eu-west-1)
    pub region: String,
    /// Bucket to sync from
    pub bucket: String,
    /// Only keys under this prefix are listed
    pub prefix: String,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Storage class that fetched objects are moved into
    pub cold_storage_class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Permanent copy of every object, stored under its raw bucket key
    pub archive_dir: PathBuf,
    /// Downstream copy, stored under the decrypted key with a decrypted body
    pub inbox_dir: PathBuf,
    /// Maximum objects fetched at once
    pub concurrency: usize,
    /// Ignore objects last modified more than this many days ago (0 = no limit)
    pub max_age_days: u64,
    /// Move fetched objects to `storage.cold_storage_class`
    pub transition: bool,
    /// Glob patterns matched against key components and decoded file names
    pub exclude_patterns: Vec<String>,
    /// Whether to fetch objects with a dot-prefixed path component
    pub sync_hidden: bool,
}

/// rclone crypt passwords
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptConfig {
    /// Files whose first line holds a password; each becomes one decrypter,
    /// tried in order
    pub password_files: Vec<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "eu-west-1".into(),
            bucket: "photosync".into(),
            prefix: String::new(),
            enforce_tls: false,
            cold_storage_class: "GLACIER_IR".into(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("~/photosync/archive"),
            inbox_dir: PathBuf::from("~/photosync/inbox"),
            concurrency: 5,
            max_age_days: 0,
            transition: true,
            exclude_patterns: vec![
                "*.trashed*".into(),
                "*.empty*".into(),
                "*.nomedia*".into(),
                "*.blank*".into(),
            ],
            sync_hidden: false,
        }
    }
}

impl PsyncConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    ///
    /// Runs before logging is up, so the caller reports the fallback.
    pub fn load(path: &Path) -> PsyncResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PsyncError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PsyncResult<()> {
        if self.storage.bucket.is_empty() {
            return Err(PsyncError::Config("storage.bucket must not be empty".into()));
        }
        if self.sync.concurrency == 0 {
            return Err(PsyncError::Config("sync.concurrency must be at least 1".into()));
        }
        if let Some(bad) = self
            .sync
            .exclude_patterns
            .iter()
            .find(|p| glob::Pattern::new(p).is_err())
        {
            return Err(PsyncError::Config(format!(
                "sync.exclude_patterns: invalid glob {bad:?}"
            )));
        }
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[storage]
endpoint = "https://s3.example.com"
region = "eu-west-2"
bucket = "my-bucket"
prefix = "pixel6/"
enforce_tls = true
cold_storage_class = "DEEP_ARCHIVE"

[sync]
archive_dir = "/srv/archive"
inbox_dir = "/srv/inbox"
concurrency = 12
max_age_days = 30
transition = false
exclude_patterns = ["*.tmp"]
sync_hidden = true

[crypt]
password_files = ["/etc/psync/pw1", "/etc/psync/pw2"]
"#;
        let config: PsyncConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.storage.endpoint, "https://s3.example.com");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.storage.prefix, "pixel6/");
        assert_eq!(config.storage.cold_storage_class, "DEEP_ARCHIVE");
        assert_eq!(config.sync.archive_dir, PathBuf::from("/srv/archive"));
        assert_eq!(config.sync.concurrency, 12);
        assert_eq!(config.sync.max_age_days, 30);
        assert!(!config.sync.transition);
        assert_eq!(config.sync.exclude_patterns, vec!["*.tmp".to_string()]);
        assert!(config.sync.sync_hidden);
        assert_eq!(config.crypt.password_files.len(), 2);
    }

    #[test]
    fn test_parse_defaults() {
        let config: PsyncConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.storage.region, "eu-west-1");
        assert!(config.storage.endpoint.is_empty());
        assert!(!config.storage.enforce_tls);
        assert_eq!(config.storage.cold_storage_class, "GLACIER_IR");
        assert_eq!(config.sync.concurrency, 5);
        assert!(config.sync.transition);
        assert_eq!(config.sync.exclude_patterns.len(), 4);
        assert!(config.crypt.password_files.is_empty());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[storage]
bucket = "various-barbed-earthworm"
"#;
        let config: PsyncConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.storage.bucket, "various-barbed-earthworm");
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.sync.concurrency, 5);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = PsyncConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PsyncConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.storage.bucket, parsed.storage.bucket);
        assert_eq!(config.sync.inbox_dir, parsed.sync.inbox_dir);
        assert_eq!(config.sync.exclude_patterns, parsed.sync.exclude_patterns);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = PsyncConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.bucket, "photosync");
    }

    #[test]
    fn test_load_rejects_zero_concurrency() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[sync]\nconcurrency = 0\n").unwrap();

        let err = PsyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, PsyncError::Config(_)));
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_load_rejects_bad_glob() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[sync]\nexclude_patterns = [\"[\"]\n").unwrap();

        assert!(PsyncConfig::load(&path).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde(Path::new("~/photos")),
            PathBuf::from("/home/tester/photos")
        );
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
