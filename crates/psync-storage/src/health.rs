//! Storage health check

use anyhow::Result;
use opendal::Operator;

/// Verify the bucket is reachable and listable by listing the root
pub async fn check_health(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|entries| {
            tracing::debug!(entries = entries.len(), "storage health check passed");
        })
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))
}
