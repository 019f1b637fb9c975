//! Fixtures shared by the integration tests.

use prize_pool::repository::{RewardRepository, RewardStatus};
use prize_pool::{
    ManualClock, MemoryRepository, Metrics, Planner, PrizeService, Reward, RewardId,
};
use prize_pool::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// 2023-11-14 22:13:20 UTC.
pub const NOW: i64 = 1_700_000_000;
pub const DAY: i64 = 86_400;

/// An active reward whose window comfortably covers `NOW`.
pub fn reward(id: RewardId, total: u64, period_days: u32) -> Reward {
    Reward {
        id,
        name: format!("reward-{}", id),
        total,
        remaining: total,
        time_begin: NOW - 3_600,
        time_end: NOW + 30 * DAY,
        period_days,
        status: RewardStatus::Active,
        ..Reward::default()
    }
}

/// A service wired over in-memory stores with a manual clock at `NOW`.
pub struct TestEnvironment {
    pub repo: Arc<MemoryRepository>,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<Metrics>,
    pub service: Arc<PrizeService>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        Self::with_rewards(repo.clone(), repo)
    }

    /// Use `rewards` for reward records while codes stay in `repo`.
    pub fn with_rewards(repo: Arc<MemoryRepository>, rewards: Arc<dyn RewardRepository>) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let metrics = Arc::new(Metrics::new());
        let service = Arc::new(PrizeService::new(
            rewards,
            repo.clone(),
            Arc::new(MemoryStore::new()),
            Duration::from_secs(2),
            Planner::default(),
            clock.clone(),
            Arc::clone(&metrics),
        ));
        Self {
            repo,
            clock,
            metrics,
            service,
        }
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
