use serde::{Deserialize, Serialize};

/// Outcome counters for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Objects returned by the bucket listing
    pub listed: usize,
    /// Objects dropped by filters, already archived, or zero-length
    pub skipped: usize,
    /// Objects written to the archive and the inbox
    pub fetched: usize,
    /// Subset of `fetched` whose body went through a decrypter
    pub decrypted: usize,
    /// Objects that failed at any stage
    pub failed: usize,
    /// Raw bytes downloaded
    pub bytes: u64,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// How an object's body reaches the inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyMode {
    /// Copied verbatim from the archive
    Plain,
    /// Decoded by the decrypter at this index in the configured list
    Encrypted(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_report_is_clean() {
        assert!(SyncReport::default().is_clean());
    }

    #[test]
    fn test_report_failures_not_clean() {
        let report = SyncReport {
            failed: 1,
            ..Default::default()
        };
        assert!(!report.is_clean());
    }
}
