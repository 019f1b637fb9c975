use super::{Reward, RewardId, RewardPatch, RewardRepository};
use crate::cache::{Cache, CacheStats};
use crate::config::CacheConfig;
use crate::error::PoolResult;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const ACTIVE_KEY: &str = "active";

/// Caches the active-reward list in front of another [`RewardRepository`].
///
/// `list_active_rewards(true)` always goes to the inner repository and warms
/// the cache. Any `update_reward` invalidates the cached list, so a truncated
/// plan is never read back stale.
pub struct CachedRewards {
    inner: Arc<dyn RewardRepository>,
    active: Cache<&'static str, Vec<Reward>>,
}

impl CachedRewards {
    pub fn new(inner: Arc<dyn RewardRepository>, config: &CacheConfig) -> Self {
        Self {
            inner,
            active: Cache::new(
                config.max_entries,
                Duration::from_secs(config.active_ttl_secs),
            ),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.active.stats()
    }
}

impl RewardRepository for CachedRewards {
    fn get_reward(&self, id: RewardId) -> BoxFuture<'_, PoolResult<Option<Reward>>> {
        self.inner.get_reward(id)
    }

    fn list_active_rewards(&self, refresh: bool) -> BoxFuture<'_, PoolResult<Vec<Reward>>> {
        Box::pin(async move {
            if !refresh {
                if let Some(rewards) = self.active.get(&ACTIVE_KEY).await {
                    return Ok(rewards.as_ref().clone());
                }
            }

            let rewards = self.inner.list_active_rewards(true).await?;
            debug!(count = rewards.len(), refresh, "Active reward list loaded");
            self.active.insert(ACTIVE_KEY, rewards.clone()).await;
            Ok(rewards)
        })
    }

    fn update_reward(&self, id: RewardId, patch: RewardPatch) -> BoxFuture<'_, PoolResult<u64>> {
        Box::pin(async move {
            let result = self.inner.update_reward(id, patch).await;
            self.active.invalidate(&ACTIVE_KEY).await;
            result
        })
    }

    fn decrement_remaining(&self, id: RewardId, n: u64, now: i64) -> BoxFuture<'_, PoolResult<u64>> {
        self.inner.decrement_remaining(id, n, now)
    }
}
