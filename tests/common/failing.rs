use futures::future::BoxFuture;
use prize_pool::repository::{Reward, RewardPatch, RewardRepository};
use prize_pool::{MemoryRepository, PoolError, PoolResult, RewardId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reward repository that can be told to fail decrements or writes.
pub struct FailingRewards {
    inner: Arc<MemoryRepository>,
    pub fail_decrement: AtomicBool,
    pub fail_update: AtomicBool,
}

impl FailingRewards {
    pub fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            fail_decrement: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    fn unavailable() -> PoolError {
        PoolError::Repository("connection reset".to_string())
    }
}

impl RewardRepository for FailingRewards {
    fn get_reward(&self, id: RewardId) -> BoxFuture<'_, PoolResult<Option<Reward>>> {
        self.inner.get_reward(id)
    }

    fn list_active_rewards(&self, refresh: bool) -> BoxFuture<'_, PoolResult<Vec<Reward>>> {
        self.inner.list_active_rewards(refresh)
    }

    fn update_reward(&self, id: RewardId, patch: RewardPatch) -> BoxFuture<'_, PoolResult<u64>> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Box::pin(async { Err(Self::unavailable()) });
        }
        self.inner.update_reward(id, patch)
    }

    fn decrement_remaining(&self, id: RewardId, n: u64, now: i64) -> BoxFuture<'_, PoolResult<u64>> {
        if self.fail_decrement.load(Ordering::SeqCst) {
            return Box::pin(async { Err(Self::unavailable()) });
        }
        self.inner.decrement_remaining(id, n, now)
    }
}
