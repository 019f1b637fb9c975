//! Single-use code cache.
//!
//! Every reward with coupon-style codes has a live set `reward_codes:{<id>}`
//! holding the codes nobody has claimed yet. The braces are a cluster hash
//! tag, keeping the live set and its staging keys in one slot. Claiming pops one member
//! atomically, so a code is handed out at most once no matter how many
//! claimants race for it.

use crate::error::PoolResult;
use crate::repository::{Code, RewardId};
use crate::store::{timed, KvStore, StagedSet, SwapOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Live set key for a reward's codes.
pub fn code_set_key(reward_id: RewardId) -> String {
    format!("reward_codes:{{{}}}", reward_id)
}

/// Outcome of a full refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub succeeded: u64,
    pub failed: u64,
    pub outcome: SwapOutcome,
}

/// Codes available in the store of record versus codes in the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeCounts {
    pub available: u64,
    pub cached: u64,
}

#[derive(Clone)]
pub struct CodeCache {
    store: Arc<dyn KvStore>,
    op_timeout: Duration,
}

impl CodeCache {
    pub fn new(store: Arc<dyn KvStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    /// Take one code out of the live set, if any is left.
    pub async fn claim(&self, reward_id: RewardId) -> PoolResult<Option<String>> {
        let key = code_set_key(reward_id);
        let code = timed("spop", self.op_timeout, self.store.spop(&key)).await?;
        if code.is_none() {
            debug!(reward_id, "Code set empty");
        }
        Ok(code)
    }

    /// Add one code to the live set. Re-importing a code is a no-op.
    pub async fn import(&self, reward_id: RewardId, code: &str) -> PoolResult<()> {
        let key = code_set_key(reward_id);
        timed("sadd", self.op_timeout, self.store.sadd(&key, code)).await?;
        Ok(())
    }

    /// Rebuild the live set from `codes`, keeping only the available ones.
    ///
    /// The new set is staged under a shadow key and swapped in atomically.
    pub async fn refresh(&self, reward_id: RewardId, codes: &[Code]) -> PoolResult<RefreshReport> {
        let key = code_set_key(reward_id);
        let mut staged = StagedSet::begin(self.store.as_ref(), &key, self.op_timeout);

        for code in codes.iter().filter(|c| c.is_available()) {
            staged.stage(&code.code).await;
        }

        let succeeded = staged.staged();
        let failed = staged.failed();
        let outcome = staged.commit().await?;

        info!(
            operation = "code_refresh",
            reward_id,
            succeeded,
            failed,
            outcome = ?outcome,
        );
        Ok(RefreshReport {
            succeeded,
            failed,
            outcome,
        })
    }

    /// Number of codes currently in the live set.
    pub async fn cached_count(&self, reward_id: RewardId) -> PoolResult<u64> {
        let key = code_set_key(reward_id);
        timed("scard", self.op_timeout, self.store.scard(&key)).await
    }

    pub async fn counts(&self, reward_id: RewardId, codes: &[Code]) -> PoolResult<CodeCounts> {
        Ok(CodeCounts {
            available: codes.iter().filter(|c| c.is_available()).count() as u64,
            cached: self.cached_count(reward_id).await?,
        })
    }
}
