//! Fetch one object into the archive and the inbox

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use opendal::Operator;
use psync_core::types::BodyMode;
use psync_crypt::Decrypter;
use tracing::{debug, info, warn};

use crate::paths::tmp_path;
use crate::resolve::SyncTarget;

/// User metadata key rclone and most phone uploaders use for the original mtime
pub const MTIME_KEY: &str = "mtime";

/// Result of fetching a single object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched { bytes: u64, decrypted: bool },
    /// Zero-length object; nothing written
    Empty,
}

/// Download `target`, write its inbox copy then its archive copy, apply the
/// recorded mtime and, when `cold` is given, rewrite it into the cold tier.
///
/// The archive copy is written last: its presence marks the object done, so
/// an object whose body fails to decrypt is retried on the next run.
pub async fn fetch_object(
    live: &Operator,
    cold: Option<&Operator>,
    decrypters: &Arc<[Decrypter]>,
    target: &SyncTarget,
) -> Result<FetchOutcome> {
    let meta = live
        .stat(&target.key)
        .await
        .with_context(|| format!("stat: {}", target.key))?;
    if meta.content_length() == 0 {
        debug!(key = %target.key, "skip: zero-length object");
        return Ok(FetchOutcome::Empty);
    }
    let user_metadata = meta.user_metadata().cloned().unwrap_or_default();

    let buffer = live
        .read(&target.key)
        .await
        .with_context(|| format!("downloading: {}", target.key))?;
    let data = Arc::new(buffer.to_vec());
    let bytes = data.len() as u64;

    let decrypted = match target.body {
        BodyMode::Plain => {
            write_atomic(&target.inbox_path, &data).await?;
            false
        }
        BodyMode::Encrypted(index) => {
            let decrypters = Arc::clone(decrypters);
            let data = Arc::clone(&data);
            let inbox_path = target.inbox_path.clone();
            tokio::task::spawn_blocking(move || {
                let decrypter = decrypters
                    .get(index)
                    .with_context(|| format!("no decrypter at index {index}"))?;
                decrypt_to_file(decrypter, &data, &inbox_path)
            })
            .await
            .context("decrypt task panicked")??;
            true
        }
    };

    write_atomic(&target.archive_path, &data).await?;

    if let Some(raw) = user_metadata.get(MTIME_KEY) {
        match parse_mtime(raw) {
            Some(mtime) => {
                let paths = vec![target.archive_path.clone(), target.inbox_path.clone()];
                tokio::task::spawn_blocking(move || {
                    paths.iter().try_for_each(|p| set_mtime(p, mtime))
                })
                .await
                .context("mtime task panicked")??;
            }
            None => warn!(key = %target.key, mtime = %raw, "unparseable mtime metadata"),
        }
    }

    if let Some(cold) = cold {
        if let Err(e) = transition(cold, &target.key, buffer, user_metadata).await {
            warn!(key = %target.key, "storage class transition failed: {e:#}");
        }
    }

    info!(
        key = %target.key,
        inbox = %target.inbox_path.display(),
        bytes,
        decrypted,
        "fetched"
    );
    Ok(FetchOutcome::Fetched { bytes, decrypted })
}

/// Write `data` to `path` through a sibling tmp file and a rename
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating dir: {}", parent.display()))?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("writing tmp: {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming to: {}", path.display()))?;
    Ok(())
}

/// Decode an rclone body into `path`. Blocking; run off the async executor.
///
/// On failure the partial tmp file is removed and `path` is left untouched.
pub fn decrypt_to_file(decrypter: &Decrypter, encrypted: &[u8], path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating dir: {}", parent.display()))?;
    }

    let tmp = tmp_path(path);
    let result = (|| -> Result<u64> {
        let file = std::fs::File::create(&tmp)
            .with_context(|| format!("creating tmp: {}", tmp.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        let n = decrypter
            .decrypt_body(encrypted, &mut writer)
            .with_context(|| format!("decrypting into {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("writing tmp: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming to: {}", path.display()))?;
        Ok(n)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Parse a decimal epoch-seconds string such as `1740303300.2`.
///
/// Fractional digits past nanosecond precision are truncated. Negative,
/// exponent or otherwise malformed values give `None`.
pub fn parse_mtime(raw: &str) -> Option<SystemTime> {
    let raw = raw.trim();
    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let digits = &frac[..frac.len().min(9)];
    let nanos = if digits.is_empty() {
        0
    } else {
        digits.parse::<u32>().ok()? * 10u32.pow(9 - digits.len() as u32)
    };
    UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
}

/// Set both access and modification time of `path`
pub fn set_mtime(path: &Path, mtime: SystemTime) -> Result<()> {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .with_context(|| format!("opening for mtime: {}", path.display()))?;
    let times = std::fs::FileTimes::new()
        .set_accessed(mtime)
        .set_modified(mtime);
    file.set_times(times)
        .with_context(|| format!("setting mtime: {}", path.display()))?;
    debug!(path = %path.display(), ?mtime, "mtime applied");
    Ok(())
}

/// Rewrite `key` through the cold-tier operator, carrying user metadata over
/// when the backend can store it.
async fn transition(
    cold: &Operator,
    key: &str,
    body: opendal::Buffer,
    user_metadata: HashMap<String, String>,
) -> Result<()> {
    let keep_metadata =
        !user_metadata.is_empty() && cold.info().full_capability().write_with_user_metadata;
    let write = cold.write_with(key, body);
    let write = if keep_metadata {
        write.user_metadata(user_metadata)
    } else {
        write
    };
    write
        .await
        .with_context(|| format!("rewriting into cold tier: {key}"))?;
    debug!(key, keep_metadata, "transitioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mtime_whole_seconds() {
        assert_eq!(
            parse_mtime("1740303300"),
            Some(UNIX_EPOCH + Duration::from_secs(1_740_303_300))
        );
    }

    #[test]
    fn test_parse_mtime_fraction() {
        assert_eq!(
            parse_mtime("1740303300.2"),
            Some(UNIX_EPOCH + Duration::new(1_740_303_300, 200_000_000))
        );
        assert_eq!(
            parse_mtime("1740303300.123456789"),
            Some(UNIX_EPOCH + Duration::new(1_740_303_300, 123_456_789))
        );
        // Truncated, not rounded
        assert_eq!(
            parse_mtime("1.9999999999"),
            Some(UNIX_EPOCH + Duration::new(1, 999_999_999))
        );
        assert_eq!(parse_mtime(".5"), Some(UNIX_EPOCH + Duration::from_millis(500)));
        assert_eq!(parse_mtime(" 7. "), Some(UNIX_EPOCH + Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_mtime_rejects_garbage() {
        for bad in ["", ".", "-1", "1e9", "abc", "1.2.3", "12a", "+5"] {
            assert_eq!(parse_mtime(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn test_set_mtime() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let mtime = UNIX_EPOCH + Duration::new(1_740_303_300, 200_000_000);
        set_mtime(&path, mtime).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_leaves_no_tmp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("DCIM/Camera/a.jpg");
        write_atomic(&path, b"jpeg").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.jpg")]);
    }

    #[test]
    fn test_decrypt_failure_leaves_nothing_behind() {
        use psync_crypt::kdf::DERIVED_LEN;
        use psync_crypt::KeyMaterial;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("inbox/a.jpg");
        let decrypter =
            Decrypter::from_keys(&KeyMaterial::from_bytes(&[1u8; DERIVED_LEN])).unwrap();

        assert!(decrypt_to_file(&decrypter, b"not an rclone body", &path).is_err());
        assert!(!path.exists());
        assert!(!tmp_path(&path).exists());
    }
}
