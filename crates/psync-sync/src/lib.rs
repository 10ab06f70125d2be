//! psync-sync: bucket → archive + inbox pipeline
//!
//! Every listed object is filtered, matched against the configured
//! decrypters by name, then fetched into two local trees: the archive keeps
//! the raw object under its bucket key, the inbox gets the decoded body
//! under the decoded name.

pub mod engine;
pub mod fetch;
pub mod filter;
pub mod paths;
pub mod resolve;

pub use engine::{plan_sync, run_sync, ProgressFn, SyncContext, SyncPlan};
pub use filter::{ObjectFilter, SkipReason};
pub use resolve::SyncTarget;
