//! Plan feeder.
//!
//! Once per tick, every live reward's release plan is scanned from the front;
//! whatever is due is credited into its pool and the consumed entries are cut
//! off the persisted plan.

use crate::error::PoolResult;
use crate::gate::InventoryGate;
use crate::metrics::FeederMetrics;
use crate::plan::ReleasePlan;
use crate::repository::{Reward, RewardPatch, RewardRepository};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Units credited across all rewards
    pub credited: u64,
    /// Rewards that received a credit
    pub rewards_credited: usize,
    /// Plans consumed down to nothing during this tick
    pub plans_drained: usize,
    /// Rewards skipped because their plan failed to decode or credit
    pub skipped: usize,
}

pub struct PlanFeeder {
    rewards: Arc<dyn RewardRepository>,
    gate: InventoryGate,
    metrics: Arc<FeederMetrics>,
}

enum FeedResult {
    Idle,
    Credited { units: u64, drained: bool },
    Skipped,
}

impl PlanFeeder {
    pub fn new(
        rewards: Arc<dyn RewardRepository>,
        gate: InventoryGate,
        metrics: Arc<FeederMetrics>,
    ) -> Self {
        Self {
            rewards,
            gate,
            metrics,
        }
    }

    /// Credit everything due at `now`.
    ///
    /// Per-reward failures are logged and skipped; only failing to list the
    /// rewards at all is an error.
    pub async fn tick(&self, now: i64) -> PoolResult<TickReport> {
        let start = Instant::now();
        let rewards = self.rewards.list_active_rewards(false).await?;
        let mut report = TickReport::default();

        for reward in rewards.iter().filter(|r| Self::is_feedable(r, now)) {
            match self.feed(reward, now).await {
                FeedResult::Idle => {}
                FeedResult::Credited { units, drained } => {
                    report.credited += units;
                    report.rewards_credited += 1;
                    if drained {
                        report.plans_drained += 1;
                        self.metrics.record_plan_drained();
                    }
                }
                FeedResult::Skipped => report.skipped += 1,
            }
        }

        if report.credited > 0 {
            if let Err(e) = self.rewards.list_active_rewards(true).await {
                warn!(error = %e, "Failed to warm the active reward cache");
            }
            info!(
                operation = "feeder_tick",
                now,
                credited = report.credited,
                rewards = report.rewards_credited,
                drained = report.plans_drained,
            );
        }

        self.metrics.record_tick(report.credited, start.elapsed());
        Ok(report)
    }

    fn is_feedable(reward: &Reward, now: i64) -> bool {
        reward.is_active()
            && reward.total > 0
            && reward.in_window(now)
            && !reward.plan.trim().is_empty()
    }

    async fn feed(&self, reward: &Reward, now: i64) -> FeedResult {
        let plan = match ReleasePlan::decode(&reward.plan) {
            Ok(plan) if plan.is_empty() => return FeedResult::Idle,
            Ok(plan) => plan,
            Err(e) => {
                error!(reward_id = reward.id, error = %e, "Skipping reward with unreadable plan");
                self.metrics.record_decode_error();
                return FeedResult::Skipped;
            }
        };

        let split = plan.split_due(now);
        if split.consumed == 0 {
            return FeedResult::Idle;
        }

        if split.due > 0 {
            match self.gate.credit(reward.id, split.due).await {
                Ok(outcome) => {
                    if outcome.compensated > 0 {
                        self.metrics.record_compensation();
                    }
                }
                Err(e) => {
                    // Plan left untouched: the same units are retried next tick.
                    error!(reward_id = reward.id, due = split.due, error = %e, "Credit failed");
                    self.metrics.record_credit_error();
                    return FeedResult::Skipped;
                }
            }
        }

        let drained = split.remainder.is_empty();
        self.write_remainder(reward, &split.remainder).await;
        debug!(
            reward_id = reward.id,
            due = split.due,
            consumed = split.consumed,
            left = split.remainder.len(),
            "Plan advanced"
        );

        FeedResult::Credited {
            units: split.due,
            drained,
        }
    }

    /// Persist the unconsumed tail. Failures are logged; the credit stands.
    async fn write_remainder(&self, reward: &Reward, remainder: &ReleasePlan) {
        let encoded = match remainder.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(reward_id = reward.id, error = %e, "Failed to encode plan remainder");
                self.metrics.record_write_failure();
                return;
            }
        };

        match self
            .rewards
            .update_reward(reward.id, RewardPatch::plan(encoded))
            .await
        {
            Ok(0) => {
                warn!(reward_id = reward.id, "Plan write-back touched no rows");
                self.metrics.record_write_failure();
            }
            Ok(_) => {}
            Err(e) => {
                error!(reward_id = reward.id, error = %e, "Plan write-back failed");
                self.metrics.record_write_failure();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ReleaseEvent;
    use crate::repository::{MemoryRepository, RewardStatus};
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        gate: InventoryGate,
        feeder: PlanFeeder,
        metrics: Arc<FeederMetrics>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let gate = InventoryGate::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let metrics = Arc::new(FeederMetrics::new());
        let feeder = PlanFeeder::new(repo.clone(), gate.clone(), Arc::clone(&metrics));
        Fixture {
            repo,
            gate,
            feeder,
            metrics,
        }
    }

    fn reward_with_plan(id: u64, events: &[(i64, u64)]) -> Reward {
        let plan = ReleasePlan::from_events(events.iter().copied().map(ReleaseEvent::from).collect());
        Reward {
            id,
            total: plan.total(),
            remaining: plan.total(),
            time_begin: NOW - 3_600,
            time_end: NOW + 86_400,
            period_days: 1,
            plan: plan.encode().unwrap(),
            ..Reward::default()
        }
    }

    #[tokio::test]
    async fn test_tick_credits_due_events_and_truncates() {
        let f = fixture();
        f.repo
            .insert_reward(reward_with_plan(1, &[(NOW - 60, 2), (NOW, 3), (NOW + 60, 4)]));

        let report = f.feeder.tick(NOW).await.unwrap();
        assert_eq!(report.credited, 5);
        assert_eq!(report.rewards_credited, 1);
        assert_eq!(report.plans_drained, 0);
        assert_eq!(f.gate.peek(1).await.unwrap(), 5);

        let stored = f.repo.get_reward(1).await.unwrap().unwrap();
        let left = ReleasePlan::decode(&stored.plan).unwrap();
        assert_eq!(left.events(), &[ReleaseEvent { due_at: NOW + 60, quantity: 4 }]);
    }

    #[tokio::test]
    async fn test_repeated_tick_at_same_time_credits_once() {
        let f = fixture();
        f.repo.insert_reward(reward_with_plan(1, &[(NOW, 3), (NOW + 60, 4)]));

        assert_eq!(f.feeder.tick(NOW).await.unwrap().credited, 3);
        assert_eq!(f.feeder.tick(NOW).await.unwrap().credited, 0);
        assert_eq!(f.gate.peek(1).await.unwrap(), 3);

        let report = f.feeder.tick(NOW + 60).await.unwrap();
        assert_eq!(report.credited, 4);
        assert_eq!(report.plans_drained, 1);
        assert_eq!(f.repo.get_reward(1).await.unwrap().unwrap().plan, "");
        assert_eq!(f.metrics.plans_drained.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_bad_plan_is_skipped_not_fatal() {
        let f = fixture();
        let mut broken = reward_with_plan(1, &[(NOW, 3)]);
        broken.plan = "{definitely not a plan".to_string();
        f.repo.insert_reward(broken);
        f.repo.insert_reward(reward_with_plan(2, &[(NOW, 6)]));

        let report = f.feeder.tick(NOW).await.unwrap();
        assert_eq!(report.credited, 6);
        assert_eq!(report.skipped, 1);
        assert_eq!(f.metrics.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(f.gate.peek(2).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_ineligible_rewards_are_not_fed() {
        let f = fixture();

        let mut disabled = reward_with_plan(1, &[(NOW, 1)]);
        disabled.status = RewardStatus::Disabled;
        let mut expired = reward_with_plan(2, &[(NOW, 1)]);
        expired.time_end = NOW - 1;
        let mut not_started = reward_with_plan(3, &[(NOW, 1)]);
        not_started.time_begin = NOW + 1;
        let mut unlimited = reward_with_plan(4, &[(NOW, 1)]);
        unlimited.total = 0;

        for reward in [disabled, expired, not_started, unlimited] {
            f.repo.insert_reward(reward);
        }

        let report = f.feeder.tick(NOW).await.unwrap();
        assert_eq!(report, TickReport::default());
        for id in 1..=4 {
            assert_eq!(f.gate.peek(id).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_legacy_plan_is_fed_and_rewritten_versioned() {
        let f = fixture();
        let mut reward = reward_with_plan(1, &[]);
        reward.total = 5;
        reward.plan = format!("[[{},2],[{},3]]", NOW, NOW + 60);
        f.repo.insert_reward(reward);

        assert_eq!(f.feeder.tick(NOW).await.unwrap().credited, 2);
        let stored = f.repo.get_reward(1).await.unwrap().unwrap();
        assert_eq!(stored.plan, format!(r#"{{"v":1,"events":[[{},3]]}}"#, NOW + 60));
    }
}
