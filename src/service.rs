//! Entry points used by request handlers and the scheduler.

use crate::clock::Clock;
use crate::codes::{CodeCache, CodeCounts, RefreshReport};
use crate::error::{PoolError, PoolResult};
use crate::feeder::{PlanFeeder, TickReport};
use crate::gate::InventoryGate;
use crate::metrics::Metrics;
use crate::planner::{Planner, SECS_PER_DAY};
use crate::repository::{CodeRepository, Reward, RewardId, RewardPatch, RewardRepository};
use crate::store::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What `reset_plan` did to a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Not plannable right now; plan cleared and pool set to 0
    Cleared,
    /// No release period; pool seeded with the whole remaining quantity
    Immediate(u64),
    /// Pool set to 0 and a fresh schedule persisted
    Scheduled { events: usize, total: u64 },
}

pub struct PrizeService {
    rewards: Arc<dyn RewardRepository>,
    codes: Arc<dyn CodeRepository>,
    gate: InventoryGate,
    code_cache: CodeCache,
    planner: Planner,
    feeder: PlanFeeder,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl PrizeService {
    pub fn new(
        rewards: Arc<dyn RewardRepository>,
        codes: Arc<dyn CodeRepository>,
        store: Arc<dyn KvStore>,
        op_timeout: Duration,
        planner: Planner,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let gate = InventoryGate::new(Arc::clone(&store), op_timeout);
        let code_cache = CodeCache::new(store, op_timeout);
        let feeder = PlanFeeder::new(
            Arc::clone(&rewards),
            gate.clone(),
            Arc::clone(&metrics.feeder),
        );
        Self {
            rewards,
            codes,
            gate,
            code_cache,
            planner,
            feeder,
            clock,
            metrics,
        }
    }

    pub fn gate(&self) -> &InventoryGate {
        &self.gate
    }

    pub fn code_cache(&self) -> &CodeCache {
        &self.code_cache
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Recompute a reward's release schedule after its configuration changed.
    pub async fn reset_plan(&self, reward_id: RewardId) -> PoolResult<PlanOutcome> {
        self.reset_plan_at(reward_id, self.clock.now()).await
    }

    pub async fn reset_plan_at(&self, reward_id: RewardId, now: i64) -> PoolResult<PlanOutcome> {
        let reward = self
            .rewards
            .get_reward(reward_id)
            .await?
            .ok_or_else(|| PoolError::NotFound(format!("reward {}", reward_id)))?;

        if !reward.is_plannable(now) {
            self.clear_plan(&reward, now).await?;
            self.gate.reset(reward_id, 0).await?;
            debug!(reward_id, "Reward not plannable, pool cleared");
            return Ok(PlanOutcome::Cleared);
        }

        if reward.period_days == 0 {
            self.clear_plan(&reward, now).await?;
            self.gate.reset(reward_id, to_counter(reward.remaining)?).await?;
            info!(
                operation = "reset_plan",
                reward_id,
                immediate = reward.remaining,
            );
            return Ok(PlanOutcome::Immediate(reward.remaining));
        }

        self.gate.reset(reward_id, 0).await?;

        // ThreadRng is not Send; keep it out of the awaits below.
        let plan = {
            let mut rng = rand::rng();
            self.planner
                .build(reward.total, reward.period_days, now, &mut rng)
        };
        let patch = RewardPatch {
            remaining: Some(reward.total),
            plan: Some(plan.encode()?),
            plan_begin: Some(now),
            plan_end: Some(now + i64::from(reward.period_days) * SECS_PER_DAY),
            updated_at: Some(now),
        };
        if self.rewards.update_reward(reward_id, patch).await? == 0 {
            return Err(PoolError::NotFound(format!("reward {}", reward_id)));
        }

        info!(
            operation = "reset_plan",
            reward_id,
            total = reward.total,
            days = reward.period_days,
            events = plan.len(),
        );
        Ok(PlanOutcome::Scheduled {
            events: plan.len(),
            total: plan.total(),
        })
    }

    async fn clear_plan(&self, reward: &Reward, now: i64) -> PoolResult<()> {
        if reward.plan.is_empty() {
            return Ok(());
        }
        let patch = RewardPatch {
            plan: Some(String::new()),
            updated_at: Some(now),
            ..RewardPatch::default()
        };
        self.rewards.update_reward(reward.id, patch).await?;
        Ok(())
    }

    /// Run the feeder once; returns the units credited.
    pub async fn tick(&self, now: i64) -> PoolResult<u64> {
        Ok(self.tick_report(now).await?.credited)
    }

    pub async fn tick_report(&self, now: i64) -> PoolResult<TickReport> {
        self.feeder.tick(now).await
    }

    /// Try to win one unit of a reward.
    ///
    /// A unit taken from the pool only counts once the authoritative remaining
    /// quantity was decremented too, which also requires the reward to be
    /// active and inside its window; otherwise the claim fails.
    pub async fn claim_reward(&self, reward_id: RewardId) -> bool {
        let claims = &self.metrics.claims;
        claims.record_attempt();

        match self.gate.claim(reward_id).await {
            Ok(true) => {}
            Ok(false) => {
                claims.record_overdrawn(reward_id);
                return false;
            }
            Err(e) => {
                warn!(reward_id, transient = e.is_transient(), error = %e, "Pool claim failed");
                claims.record_store_error();
                return false;
            }
        }

        match self
            .rewards
            .decrement_remaining(reward_id, 1, self.clock.now())
            .await
        {
            Ok(rows) if rows > 0 => {
                claims.record_granted(reward_id);
                true
            }
            Ok(_) => {
                warn!(reward_id, "Reward exhausted or not claimable after pool claim");
                claims.record_fail_closed(reward_id);
                false
            }
            Err(e) => {
                warn!(reward_id, error = %e, "Remaining quantity update failed after pool claim");
                claims.record_fail_closed(reward_id);
                false
            }
        }
    }

    /// Take one single-use code, if any is left.
    ///
    /// A popped code is only handed out once its record moved from available
    /// to consumed. Codes a refresh put back after they were spent are dropped
    /// and the next one is popped, at most once per member of the set.
    pub async fn claim_code(&self, reward_id: RewardId) -> Option<String> {
        let metrics = &self.metrics.codes;
        let mut budget: Option<u64> = None;

        loop {
            let code = match self.code_cache.claim(reward_id).await {
                Ok(code) => code,
                Err(e) => {
                    warn!(reward_id, error = %e, "Code claim failed");
                    None
                }
            };
            let Some(code) = code else {
                metrics.record_claim(false);
                return None;
            };

            match self.codes.mark_code_consumed(&code, self.clock.now()).await {
                Ok(0) => {
                    debug!(reward_id, code = %code, "Dropped code that was already spent");
                    metrics.record_already_spent();
                    let left = match budget {
                        Some(left) => left,
                        None => self.code_cache.cached_count(reward_id).await.unwrap_or(0),
                    };
                    if left == 0 {
                        metrics.record_claim(false);
                        return None;
                    }
                    budget = Some(left - 1);
                }
                Ok(_) => {
                    metrics.record_claim(true);
                    return Some(code);
                }
                Err(e) => {
                    // The code is already out of the set; hand it out anyway.
                    warn!(reward_id, code = %code, error = %e, "Failed to mark code consumed");
                    metrics.record_mark_failure();
                    metrics.record_claim(true);
                    return Some(code);
                }
            }
        }
    }

    /// Persist a new code and make it claimable. Returns `false` for a code
    /// that already existed.
    pub async fn import_code(&self, reward_id: RewardId, code: &str) -> PoolResult<bool> {
        let created = self.codes.insert_code(reward_id, code).await?;
        if created {
            self.code_cache.import(reward_id, code).await?;
            self.metrics.codes.record_import();
        }
        Ok(created)
    }

    /// Rebuild a reward's live code set from the store of record.
    pub async fn refresh_codes(&self, reward_id: RewardId) -> PoolResult<RefreshReport> {
        let codes = self.codes.search_codes(reward_id).await?;
        let report = self.code_cache.refresh(reward_id, &codes).await?;
        self.metrics
            .codes
            .record_refresh(report.succeeded, report.failed);
        Ok(report)
    }

    pub async fn code_counts(&self, reward_id: RewardId) -> PoolResult<CodeCounts> {
        let codes = self.codes.search_codes(reward_id).await?;
        self.code_cache.counts(reward_id, &codes).await
    }

    pub async fn pool_count(&self, reward_id: RewardId) -> PoolResult<i64> {
        self.gate.peek(reward_id).await
    }

    pub async fn reset_all_pools(&self) -> PoolResult<()> {
        warn!(operation = "reset_all_pools", "Dropping every pool counter");
        self.gate.reset_all().await
    }

    pub async fn retire(&self, reward_id: RewardId) -> PoolResult<()> {
        self.gate.retire(reward_id).await
    }

    /// `reset_plan` for each id, logging failures instead of stopping.
    pub async fn reset_plans(&self, ids: &[RewardId]) -> usize {
        let now = self.clock.now();
        let mut scheduled = 0;
        for &id in ids {
            match self.reset_plan_at(id, now).await {
                Ok(PlanOutcome::Scheduled { .. }) | Ok(PlanOutcome::Immediate(_)) => scheduled += 1,
                Ok(PlanOutcome::Cleared) => {}
                Err(e) => error!(reward_id = id, error = %e, "Failed to reset plan"),
            }
        }
        scheduled
    }
}

fn to_counter(n: u64) -> PoolResult<i64> {
    i64::try_from(n).map_err(|_| PoolError::InvalidArgument(format!("{} units overflow the pool", n)))
}
