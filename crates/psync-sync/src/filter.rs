//! Which listed objects are worth fetching

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use psync_core::config::SyncConfig;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Why an object was not fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A key component or the decoded file name matched this exclude pattern
    Excluded(String),
    /// A key component starts with `.`
    Hidden,
    /// Last modified before the `max_age_days` cut-off
    TooOld,
    /// The archive already holds this key
    AlreadyArchived,
    /// The object has no body
    Empty,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Excluded(pattern) => write!(f, "excluded by {pattern:?}"),
            SkipReason::Hidden => f.write_str("hidden"),
            SkipReason::TooOld => f.write_str("too old"),
            SkipReason::AlreadyArchived => f.write_str("already archived"),
            SkipReason::Empty => f.write_str("empty"),
        }
    }
}

/// Exclude globs, hidden-component and age checks
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    excludes: Vec<glob::Pattern>,
    sync_hidden: bool,
    max_age: Option<Duration>,
}

impl ObjectFilter {
    pub fn new(patterns: &[String], sync_hidden: bool, max_age_days: u64) -> Result<Self> {
        let excludes = patterns
            .iter()
            .map(|p| glob::Pattern::new(p).with_context(|| format!("invalid exclude glob {p:?}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            excludes,
            sync_hidden,
            max_age: (max_age_days > 0)
                .then(|| Duration::from_secs(max_age_days.saturating_mul(SECS_PER_DAY))),
        })
    }

    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        Self::new(&cfg.exclude_patterns, cfg.sync_hidden, cfg.max_age_days)
    }

    /// Checks on the raw bucket key, before any name is decoded.
    pub fn check_key(&self, key: &str) -> Result<(), SkipReason> {
        for component in key.split('/').filter(|c| !c.is_empty()) {
            if !self.sync_hidden && component.starts_with('.') {
                return Err(SkipReason::Hidden);
            }
            self.check_component(component)?;
        }
        Ok(())
    }

    /// Objects without a last-modified time always pass.
    pub fn check_age(
        &self,
        last_modified: Option<SystemTime>,
        now: SystemTime,
    ) -> Result<(), SkipReason> {
        let (Some(max_age), Some(modified)) = (self.max_age, last_modified) else {
            return Ok(());
        };
        match now.duration_since(modified) {
            Ok(age) if age > max_age => Err(SkipReason::TooOld),
            _ => Ok(()),
        }
    }

    /// Checks on the decoded file name
    pub fn check_name(&self, decoded_path: &str) -> Result<(), SkipReason> {
        match Path::new(decoded_path).file_name().and_then(|n| n.to_str()) {
            Some(name) => self.check_component(name),
            None => Ok(()),
        }
    }

    fn check_component(&self, component: &str) -> Result<(), SkipReason> {
        match self.excludes.iter().find(|p| p.matches(component)) {
            Some(pattern) => Err(SkipReason::Excluded(pattern.as_str().to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> ObjectFilter {
        ObjectFilter::from_config(&SyncConfig::default()).unwrap()
    }

    #[test]
    fn test_default_excludes() {
        let f = default_filter();
        assert!(f.check_key("pixel6/DCIM/IMG_0001.jpg").is_ok());
        assert_eq!(
            f.check_key("pixel6/DCIM/IMG_0001.trashed-1700000000.jpg"),
            Err(SkipReason::Excluded("*.trashed*".into()))
        );
        assert!(f.check_key("pixel6/Pictures/x.nomedia").is_err());
        assert!(f.check_key("pixel6/a.empty/b.jpg").is_err());
    }

    #[test]
    fn test_hidden_components() {
        let f = default_filter();
        assert_eq!(f.check_key("pixel6/.thumbnails/a.jpg"), Err(SkipReason::Hidden));
        assert_eq!(f.check_key(".hidden"), Err(SkipReason::Hidden));

        let f = ObjectFilter::new(&[], true, 0).unwrap();
        assert!(f.check_key("pixel6/.thumbnails/a.jpg").is_ok());
    }

    #[test]
    fn test_decoded_name() {
        let f = default_filter();
        assert!(f.check_name("DCIM/IMG_0001.jpg").is_ok());
        assert_eq!(
            f.check_name("DCIM/.blank-thing"),
            Err(SkipReason::Excluded("*.blank*".into()))
        );
        assert!(f.check_name("").is_ok());
    }

    #[test]
    fn test_age() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100 * SECS_PER_DAY);
        let f = ObjectFilter::new(&[], false, 30).unwrap();

        let recent = now - Duration::from_secs(SECS_PER_DAY);
        let old = now - Duration::from_secs(31 * SECS_PER_DAY);
        assert!(f.check_age(Some(recent), now).is_ok());
        assert_eq!(f.check_age(Some(old), now), Err(SkipReason::TooOld));
        assert!(f.check_age(None, now).is_ok());
        // Clock skew: modified in the future
        assert!(f.check_age(Some(now + Duration::from_secs(60)), now).is_ok());
    }

    #[test]
    fn test_huge_max_age_keeps_everything() {
        let f = ObjectFilter::new(&[], false, u64::MAX).unwrap();
        assert!(f.check_age(Some(SystemTime::UNIX_EPOCH), SystemTime::now()).is_ok());
    }

    #[test]
    fn test_age_disabled() {
        let f = ObjectFilter::new(&[], false, 0).unwrap();
        assert!(f.check_age(Some(SystemTime::UNIX_EPOCH), SystemTime::now()).is_ok());
    }

    #[test]
    fn test_bad_glob() {
        assert!(ObjectFilter::new(&["[".into()], false, 0).is_err());
    }
}
