//! Mapping bucket keys onto local paths

use std::path::{Component, Path, PathBuf};

use psync_core::{PsyncError, PsyncResult};

/// Join `relative` under `root`, normalising `.` and `..` lexically.
///
/// Leading separators are ignored, so `/a/b` lands at `root/a/b`. A path
/// that climbs above `root`, or that names no file at all, is rejected.
pub fn confined_join(root: &Path, relative: &str) -> PsyncResult<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PsyncError::Sync(format!(
                        "path escapes {}: {relative:?}",
                        root.display()
                    )));
                }
            }
        }
    }
    if parts.is_empty() {
        return Err(PsyncError::Sync(format!("empty path: {relative:?}")));
    }

    let mut joined = root.to_path_buf();
    joined.extend(parts);
    Ok(joined)
}

/// Sibling scratch file for an atomic write to `path`
pub fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.psync-tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key() {
        let p = confined_join(Path::new("/srv/archive"), "pixel6/DCIM/a.jpg").unwrap();
        assert_eq!(p, PathBuf::from("/srv/archive/pixel6/DCIM/a.jpg"));
    }

    #[test]
    fn test_leading_and_doubled_separators() {
        let p = confined_join(Path::new("/srv"), "/a//b/").unwrap();
        assert_eq!(p, PathBuf::from("/srv/a/b"));
    }

    #[test]
    fn test_inner_parent_is_normalised() {
        let p = confined_join(Path::new("/srv"), "a/./b/../c").unwrap();
        assert_eq!(p, PathBuf::from("/srv/a/c"));
    }

    #[test]
    fn test_escape_rejected() {
        for bad in ["..", "../etc/passwd", "a/../../b", "/../x"] {
            let err = confined_join(Path::new("/srv"), bad).unwrap_err();
            assert!(matches!(err, PsyncError::Sync(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_empty_rejected() {
        assert!(confined_join(Path::new("/srv"), "").is_err());
        assert!(confined_join(Path::new("/srv"), "/").is_err());
        assert!(confined_join(Path::new("/srv"), "a/..").is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_never_escapes_root(
            parts in proptest::collection::vec(
                proptest::prop_oneof!["\\.\\.", "\\.", "", "[a-z]{1,4}"],
                0..10,
            )
        ) {
            let root = Path::new("/srv/archive");
            if let Ok(joined) = confined_join(root, &parts.join("/")) {
                proptest::prop_assert!(joined.starts_with(root));
                proptest::prop_assert!(joined != root);
                proptest::prop_assert!(!joined.components().any(|c| c == Component::ParentDir));
            }
        }
    }

    #[test]
    fn test_tmp_path_is_hidden_sibling() {
        let tmp = tmp_path(Path::new("/srv/inbox/a.jpg"));
        assert_eq!(tmp, PathBuf::from("/srv/inbox/.a.jpg.psync-tmp"));
    }
}
