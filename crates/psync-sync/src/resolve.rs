//! Bucket key → decoded name and local destinations

use std::path::{Path, PathBuf};

use psync_core::types::BodyMode;
use psync_core::PsyncResult;
use psync_crypt::{resolve_path, Decrypter};

use crate::paths::confined_join;

/// One object selected for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Raw key in the bucket
    pub key: String,
    /// Key with encrypted names decoded; equal to `key` for plain objects
    pub decoded: String,
    /// `archive_dir/<key>`
    pub archive_path: PathBuf,
    /// `inbox_dir/<decoded>`
    pub inbox_path: PathBuf,
    pub body: BodyMode,
}

/// Decode `key` with the first decrypter that accepts it.
///
/// The whole key is tried first. When that fails and the key sits under
/// `prefix`, the remainder is tried on its own and the prefix is kept
/// verbatim, since rclone remotes are often rooted below the bucket prefix.
pub fn resolve_name(decrypters: &[Decrypter], key: &str, prefix: &str) -> (String, BodyMode) {
    if let Some((index, decoded, _)) = resolve_path(decrypters, key) {
        return (decoded, BodyMode::Encrypted(index));
    }
    if let Some(rest) = key.strip_prefix(prefix).filter(|r| !prefix.is_empty() && !r.is_empty()) {
        if let Some((index, decoded, _)) = resolve_path(decrypters, rest) {
            return (format!("{prefix}{decoded}"), BodyMode::Encrypted(index));
        }
    }
    (key.to_string(), BodyMode::Plain)
}

pub fn resolve_target(
    decrypters: &[Decrypter],
    key: &str,
    prefix: &str,
    archive_dir: &Path,
    inbox_dir: &Path,
) -> PsyncResult<SyncTarget> {
    let (decoded, body) = resolve_name(decrypters, key, prefix);
    Ok(SyncTarget {
        archive_path: confined_join(archive_dir, key)?,
        inbox_path: confined_join(inbox_dir, &decoded)?,
        key: key.to_string(),
        decoded,
        body,
    })
}
