//! Stage-and-swap for whole sets.
//!
//! A [`StagedSet`] fills a shadow key and then renames it over the live key in
//! one atomic step, so readers of the live key only ever see the complete old
//! set or the complete new one.

use super::{timed, KvStore};
use crate::error::PoolResult;
use std::time::Duration;
use tracing::{debug, warn};

/// What a committed swap did to the live key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The staged set replaced the live set.
    Swapped,
    /// Nothing was staged and nothing failed: the live key was deleted.
    Cleared,
    /// Nothing was staged because every insert failed: the live set was kept.
    Kept,
}

pub struct StagedSet<'a> {
    store: &'a dyn KvStore,
    live: String,
    staging: String,
    op_timeout: Duration,
    staged: u64,
    failed: u64,
}

impl<'a> StagedSet<'a> {
    /// Start a new stage for `live` under its own staging key, so concurrent
    /// stages of the same live key never touch each other's members.
    pub fn begin(store: &'a dyn KvStore, live: &str, op_timeout: Duration) -> Self {
        let staging = format!("{}:staging:{:016x}", live, rand::random::<u64>());
        Self {
            store,
            live: live.to_string(),
            staging,
            op_timeout,
            staged: 0,
            failed: 0,
        }
    }

    /// Add one member to the staging key. Failures are counted, not propagated.
    pub async fn stage(&mut self, member: &str) -> bool {
        match timed("sadd", self.op_timeout, self.store.sadd(&self.staging, member)).await {
            Ok(_) => {
                self.staged += 1;
                true
            }
            Err(e) => {
                warn!(key = %self.staging, error = %e, "Failed to stage member");
                self.failed += 1;
                false
            }
        }
    }

    pub fn staged(&self) -> u64 {
        self.staged
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Publish the staged set over the live key.
    pub async fn commit(self) -> PoolResult<SwapOutcome> {
        if self.staged > 0 {
            let renamed =
                timed("rename", self.op_timeout, self.store.rename(&self.staging, &self.live)).await;
            if let Err(e) = renamed {
                if let Err(cleanup) = timed("del", self.op_timeout, self.store.del(&self.staging)).await {
                    warn!(key = %self.staging, error = %cleanup, "Failed to drop staging key");
                }
                return Err(e);
            }
            debug!(key = %self.live, staged = self.staged, "Staged set swapped in");
            return Ok(SwapOutcome::Swapped);
        }

        if self.failed == 0 {
            timed("del", self.op_timeout, self.store.del(&self.live)).await?;
            debug!(key = %self.live, "Staged set empty, live key cleared");
            Ok(SwapOutcome::Cleared)
        } else {
            warn!(
                key = %self.live,
                failed = self.failed,
                "Nothing staged, keeping the live set"
            );
            Ok(SwapOutcome::Kept)
        }
    }
}
