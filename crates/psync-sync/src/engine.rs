//! Sync engine: plan the run from a bucket listing, then fetch with bounded
//! concurrency and tally a [`SyncReport`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use futures::StreamExt;
use opendal::Operator;
use psync_core::config::{expand_tilde, PsyncConfig};
use psync_core::types::SyncReport;
use psync_crypt::Decrypter;
use psync_storage::BucketOperators;
use tracing::{debug, info, warn};

use crate::fetch::{fetch_object, FetchOutcome};
use crate::filter::{ObjectFilter, SkipReason};
use crate::resolve::{resolve_target, SyncTarget};

/// Progress callback type (items_done, items_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Everything a run needs, built once from config
pub struct SyncContext {
    pub live: Operator,
    /// Cold-tier operator; `None` disables transitions
    pub cold: Option<Operator>,
    pub prefix: String,
    pub archive_dir: PathBuf,
    pub inbox_dir: PathBuf,
    pub decrypters: Arc<[Decrypter]>,
    pub filter: ObjectFilter,
    pub concurrency: usize,
}

impl SyncContext {
    pub fn from_config(
        config: &PsyncConfig,
        operators: BucketOperators,
        decrypters: Vec<Decrypter>,
    ) -> Result<Self> {
        Ok(Self {
            live: operators.live,
            cold: config.sync.transition.then_some(operators.cold),
            prefix: config.storage.prefix.clone(),
            archive_dir: expand_tilde(&config.sync.archive_dir),
            inbox_dir: expand_tilde(&config.sync.inbox_dir),
            decrypters: decrypters.into(),
            filter: ObjectFilter::from_config(&config.sync).context("building object filter")?,
            concurrency: config.sync.concurrency.max(1),
        })
    }
}

/// Objects to fetch, with the listing already counted in `report`
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub targets: Vec<SyncTarget>,
    pub report: SyncReport,
}

/// List the bucket under the prefix and decide what to fetch.
///
/// Nothing is written; `sync --dry-run` stops here.
pub async fn plan_sync(ctx: &SyncContext, now: SystemTime) -> Result<SyncPlan> {
    let list_path = if ctx.prefix.is_empty() { "/" } else { ctx.prefix.as_str() };
    let entries = ctx
        .live
        .list_with(list_path)
        .recursive(true)
        .await
        .with_context(|| format!("listing {list_path}"))?;

    let mut plan = SyncPlan::default();
    let mut inbox_paths = HashSet::new();
    for entry in entries {
        if entry.metadata().is_dir() {
            continue;
        }
        let key = entry.path();
        plan.report.listed += 1;

        let checked = ctx
            .filter
            .check_key(key)
            .and_then(|()| {
                let modified = entry.metadata().last_modified().map(SystemTime::from);
                ctx.filter.check_age(modified, now)
            });
        if let Err(reason) = checked {
            skip(&mut plan.report, key, &reason);
            continue;
        }

        let target = match resolve_target(
            &ctx.decrypters,
            key,
            &ctx.prefix,
            &ctx.archive_dir,
            &ctx.inbox_dir,
        ) {
            Ok(t) => t,
            Err(e) => {
                warn!(key, "unusable key: {e}");
                plan.report.failed += 1;
                continue;
            }
        };

        if let Err(reason) = ctx.filter.check_name(&target.decoded) {
            skip(&mut plan.report, key, &reason);
            continue;
        }
        if tokio::fs::try_exists(&target.archive_path)
            .await
            .unwrap_or(false)
        {
            skip(&mut plan.report, key, &SkipReason::AlreadyArchived);
            continue;
        }
        // Two keys decoding to one inbox file would race on its tmp file.
        if !inbox_paths.insert(target.inbox_path.clone()) {
            warn!(
                key,
                inbox = %target.inbox_path.display(),
                "another object already maps to this inbox path"
            );
            plan.report.failed += 1;
            continue;
        }

        plan.targets.push(target);
    }

    info!(
        listed = plan.report.listed,
        skipped = plan.report.skipped,
        to_fetch = plan.targets.len(),
        "planned"
    );
    Ok(plan)
}

/// Plan, then fetch every target with at most `ctx.concurrency` in flight.
///
/// Per-object failures are logged and counted; only a failed listing is an
/// error.
pub async fn run_sync(ctx: &SyncContext, progress: Option<&ProgressFn>) -> Result<SyncReport> {
    let SyncPlan { targets, mut report } = plan_sync(ctx, SystemTime::now()).await?;
    let total = targets.len() as u64;

    let mut results = futures::stream::iter(targets)
        .map(|target| async move {
            let outcome =
                fetch_object(&ctx.live, ctx.cold.as_ref(), &ctx.decrypters, &target).await;
            (target, outcome)
        })
        .buffer_unordered(ctx.concurrency);

    let mut done = 0u64;
    while let Some((target, outcome)) = results.next().await {
        done += 1;
        match outcome {
            Ok(FetchOutcome::Fetched { bytes, decrypted }) => {
                report.fetched += 1;
                report.bytes += bytes;
                if decrypted {
                    report.decrypted += 1;
                }
            }
            Ok(FetchOutcome::Empty) => skip(&mut report, &target.key, &SkipReason::Empty),
            Err(e) => {
                warn!(key = %target.key, "fetch failed: {e:#}");
                report.failed += 1;
            }
        }
        if let Some(cb) = progress {
            cb(done, total, &target.decoded);
        }
    }

    info!(
        fetched = report.fetched,
        decrypted = report.decrypted,
        skipped = report.skipped,
        failed = report.failed,
        bytes = report.bytes,
        "sync complete"
    );
    Ok(report)
}

fn skip(report: &mut SyncReport, key: &str, reason: &SkipReason) {
    debug!(key, %reason, "skip");
    report.skipped += 1;
}
