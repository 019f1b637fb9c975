//! Inventory gate: the claim/credit protocol over the shared pool counter.
//!
//! Each reward's claimable units live in one field of the `reward_pool` hash.
//! A claim is a single atomic decrement; the unit is won iff the value after
//! the decrement is still non-negative. Losing claims leave the counter below
//! zero. The claim path never repairs that: the next credit does.

use crate::error::{PoolError, PoolResult};
use crate::repository::RewardId;
use crate::store::{timed, KvStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hash holding one counter field per reward.
pub const POOL_KEY: &str = "reward_pool";

/// Result of crediting units into a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditOutcome {
    /// Counter value after the credit (and compensation, if any)
    pub value: i64,
    /// Extra units added because the post-credit value came back short
    pub compensated: u64,
}

#[derive(Clone)]
pub struct InventoryGate {
    store: Arc<dyn KvStore>,
    op_timeout: Duration,
}

impl InventoryGate {
    pub fn new(store: Arc<dyn KvStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    /// Try to take one unit.
    pub async fn claim(&self, reward_id: RewardId) -> PoolResult<bool> {
        let field = reward_id.to_string();
        let value = timed(
            "hincrby",
            self.op_timeout,
            self.store.hincr_by(POOL_KEY, &field, -1),
        )
        .await?;
        Ok(value >= 0)
    }

    /// Add `n` units.
    ///
    /// When the counter comes back below `n` (earlier overdraws pushed it
    /// negative), the shortfall is added once more so the pool ends up holding
    /// at least the credited units. A second shortfall is only logged.
    pub async fn credit(&self, reward_id: RewardId, n: u64) -> PoolResult<CreditOutcome> {
        let n = i64::try_from(n)
            .map_err(|_| PoolError::InvalidArgument(format!("credit of {} units overflows", n)))?;
        let field = reward_id.to_string();

        let value = timed(
            "hincrby",
            self.op_timeout,
            self.store.hincr_by(POOL_KEY, &field, n),
        )
        .await?;
        if value >= n {
            debug!(reward_id, credited = n, value, "Pool credited");
            return Ok(CreditOutcome {
                value,
                compensated: 0,
            });
        }

        let shortfall = n - value;
        debug!(reward_id, value, shortfall, "Pool came back short, compensating");
        let value = timed(
            "hincrby",
            self.op_timeout,
            self.store.hincr_by(POOL_KEY, &field, shortfall),
        )
        .await?;
        if value < n {
            warn!(
                reward_id,
                credited = n,
                value,
                "Pool still short after compensation"
            );
        }

        Ok(CreditOutcome {
            value,
            compensated: shortfall as u64,
        })
    }

    /// Best-effort read of the counter; a missing counter reads as 0.
    pub async fn peek(&self, reward_id: RewardId) -> PoolResult<i64> {
        let field = reward_id.to_string();
        let value = timed("hget", self.op_timeout, self.store.hget(POOL_KEY, &field)).await?;
        Ok(value.unwrap_or(0))
    }

    /// Unconditionally set the counter.
    pub async fn reset(&self, reward_id: RewardId, value: i64) -> PoolResult<()> {
        let field = reward_id.to_string();
        timed(
            "hset",
            self.op_timeout,
            self.store.hset(POOL_KEY, &field, value),
        )
        .await
    }

    /// Drop the counter of a retired reward.
    pub async fn retire(&self, reward_id: RewardId) -> PoolResult<()> {
        let field = reward_id.to_string();
        timed("hdel", self.op_timeout, self.store.hdel(POOL_KEY, &field)).await
    }

    /// Drop every pool counter.
    pub async fn reset_all(&self) -> PoolResult<()> {
        timed("del", self.op_timeout, self.store.del(POOL_KEY)).await
    }
}
