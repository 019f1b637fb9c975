//! Reward and code records, and the storage contract they are read through.
//!
//! The records themselves belong to an external relational store. The engine
//! only needs the handful of operations on [`RewardRepository`] and
//! [`CodeRepository`]; [`MemoryRepository`] implements both for standalone
//! runs and tests.

pub mod cached;
pub mod memory;

pub use cached::CachedRewards;
pub use memory::MemoryRepository;

use crate::error::PoolResult;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub type RewardId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RewardStatus {
    #[default]
    Active,
    Disabled,
}

/// A limited-quantity reward available during `[time_begin, time_end)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    /// Plannable quantity
    pub total: u64,
    /// Authoritative quantity not yet given out
    pub remaining: u64,
    pub time_begin: i64,
    pub time_end: i64,
    /// Days over which `total` is released; 0 releases everything at once
    pub period_days: u32,
    pub status: RewardStatus,
    /// Encoded [`crate::plan::ReleasePlan`]
    pub plan: String,
    pub plan_begin: i64,
    pub plan_end: i64,
    pub updated_at: i64,
}

impl Reward {
    pub fn is_active(&self) -> bool {
        self.status == RewardStatus::Active
    }

    pub fn in_window(&self, now: i64) -> bool {
        self.time_begin <= now && now <= self.time_end
    }

    /// Whether a unit of this reward can be given out at `now`.
    pub fn is_claimable(&self, now: i64) -> bool {
        self.is_active() && self.time_begin <= now && now < self.time_end
    }

    /// Whether a release schedule can be built for this reward at `now`.
    pub fn is_plannable(&self, now: i64) -> bool {
        self.is_active()
            && self.time_begin < now
            && now < self.time_end
            && self.remaining > 0
            && self.total > 0
    }
}

/// Partial update of a reward; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardPatch {
    pub remaining: Option<u64>,
    pub plan: Option<String>,
    pub plan_begin: Option<i64>,
    pub plan_end: Option<i64>,
    pub updated_at: Option<i64>,
}

impl RewardPatch {
    pub fn plan(plan: impl Into<String>) -> Self {
        Self {
            plan: Some(plan.into()),
            ..Self::default()
        }
    }

    pub fn apply(&self, reward: &mut Reward) {
        if let Some(remaining) = self.remaining {
            reward.remaining = remaining;
        }
        if let Some(ref plan) = self.plan {
            reward.plan = plan.clone();
        }
        if let Some(plan_begin) = self.plan_begin {
            reward.plan_begin = plan_begin;
        }
        if let Some(plan_end) = self.plan_end {
            reward.plan_end = plan_end;
        }
        if let Some(updated_at) = self.updated_at {
            reward.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CodeStatus {
    #[default]
    Available,
    Disabled,
    Consumed,
}

/// A single-use claim code belonging to a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub reward_id: RewardId,
    pub code: String,
    #[serde(default)]
    pub status: CodeStatus,
    #[serde(default)]
    pub updated_at: i64,
}

impl Code {
    pub fn is_available(&self) -> bool {
        self.status == CodeStatus::Available
    }
}

/// Reward records in the store of record.
pub trait RewardRepository: Send + Sync {
    fn get_reward(&self, id: RewardId) -> BoxFuture<'_, PoolResult<Option<Reward>>>;

    /// Every reward with active status. `refresh` bypasses any cache in front
    /// of the store and repopulates it.
    fn list_active_rewards(&self, refresh: bool) -> BoxFuture<'_, PoolResult<Vec<Reward>>>;

    /// Apply `patch`; returns the number of rows affected.
    fn update_reward(&self, id: RewardId, patch: RewardPatch) -> BoxFuture<'_, PoolResult<u64>>;

    /// Decrement `remaining` by `n` for a reward that is claimable at `now`,
    /// unless that would drop below zero; returns the number of rows affected.
    fn decrement_remaining(&self, id: RewardId, n: u64, now: i64) -> BoxFuture<'_, PoolResult<u64>>;
}

/// Code records in the store of record.
pub trait CodeRepository: Send + Sync {
    fn search_codes(&self, reward_id: RewardId) -> BoxFuture<'_, PoolResult<Vec<Code>>>;

    /// Move an available code to consumed; returns the number of rows affected,
    /// 0 when the code was already spent.
    fn mark_code_consumed<'a>(&'a self, code: &'a str, now: i64) -> BoxFuture<'a, PoolResult<u64>>;

    /// Store a new available code; returns `false` when it already exists.
    fn insert_code<'a>(&'a self, reward_id: RewardId, code: &'a str) -> BoxFuture<'a, PoolResult<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward() -> Reward {
        Reward {
            id: 1,
            total: 10,
            remaining: 10,
            time_begin: 100,
            time_end: 1_000,
            ..Reward::default()
        }
    }

    #[test]
    fn test_is_plannable() {
        assert!(reward().is_plannable(500));
        assert!(!reward().is_plannable(100));
        assert!(!reward().is_plannable(1_000));

        let mut r = reward();
        r.status = RewardStatus::Disabled;
        assert!(!r.is_plannable(500));

        let mut r = reward();
        r.remaining = 0;
        assert!(!r.is_plannable(500));
    }

    #[test]
    fn test_is_claimable() {
        assert!(reward().is_claimable(100));
        assert!(reward().is_claimable(999));
        assert!(!reward().is_claimable(99));
        assert!(!reward().is_claimable(1_000));

        let mut r = reward();
        r.status = RewardStatus::Disabled;
        assert!(!r.is_claimable(500));
    }

    #[test]
    fn test_patch_apply() {
        let mut r = reward();
        RewardPatch {
            remaining: Some(3),
            plan: Some("[]".to_string()),
            ..RewardPatch::default()
        }
        .apply(&mut r);
        assert_eq!(r.remaining, 3);
        assert_eq!(r.plan, "[]");
        assert_eq!(r.total, 10);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RewardStatus::Disabled.to_string(), "disabled");
        assert_eq!("consumed".parse::<CodeStatus>().unwrap(), CodeStatus::Consumed);
    }
}
