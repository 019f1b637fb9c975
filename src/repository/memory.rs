use super::{Code, CodeRepository, CodeStatus, Reward, RewardId, RewardPatch, RewardRepository};
use crate::error::{PoolError, PoolResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct SeedCodes {
    reward_id: RewardId,
    codes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SeedData {
    #[serde(default)]
    rewards: Vec<Reward>,
    #[serde(default)]
    codes: Vec<SeedCodes>,
}

/// In-memory store of record for rewards and codes.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rewards: DashMap<RewardId, Reward>,
    codes: DashMap<String, Code>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rewards and codes from a JSON seed file:
    /// `{"rewards": [...], "codes": [{"reward_id": 1, "codes": ["A", "B"]}]}`.
    pub fn from_seed_file(path: &Path) -> PoolResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let seed: SeedData = serde_json::from_str(&content)?;

        let repo = Self::new();
        for reward in seed.rewards {
            repo.insert_reward(reward);
        }
        for batch in seed.codes {
            for code in batch.codes {
                repo.add_code(batch.reward_id, &code);
            }
        }

        info!(
            operation = "seed_load",
            path = %path.display(),
            rewards = repo.rewards.len(),
            codes = repo.codes.len(),
        );
        Ok(repo)
    }

    pub fn insert_reward(&self, reward: Reward) {
        self.rewards.insert(reward.id, reward);
    }

    pub fn reward_ids(&self) -> Vec<RewardId> {
        let mut ids: Vec<_> = self.rewards.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn add_code(&self, reward_id: RewardId, code: &str) -> bool {
        match self.codes.entry(code.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Code {
                    reward_id,
                    code: code.to_string(),
                    status: CodeStatus::Available,
                    updated_at: 0,
                });
                true
            }
        }
    }
}

impl RewardRepository for MemoryRepository {
    fn get_reward(&self, id: RewardId) -> BoxFuture<'_, PoolResult<Option<Reward>>> {
        Box::pin(async move { Ok(self.rewards.get(&id).map(|r| r.value().clone())) })
    }

    fn list_active_rewards(&self, _refresh: bool) -> BoxFuture<'_, PoolResult<Vec<Reward>>> {
        Box::pin(async move {
            let mut rewards: Vec<Reward> = self
                .rewards
                .iter()
                .filter(|r| r.is_active())
                .map(|r| r.value().clone())
                .collect();
            rewards.sort_by_key(|r| r.id);
            Ok(rewards)
        })
    }

    fn update_reward(&self, id: RewardId, patch: RewardPatch) -> BoxFuture<'_, PoolResult<u64>> {
        Box::pin(async move {
            match self.rewards.get_mut(&id) {
                Some(mut reward) => {
                    patch.apply(&mut reward);
                    Ok(1)
                }
                None => Ok(0),
            }
        })
    }

    fn decrement_remaining(&self, id: RewardId, n: u64, now: i64) -> BoxFuture<'_, PoolResult<u64>> {
        Box::pin(async move {
            match self.rewards.get_mut(&id) {
                Some(mut reward) if reward.is_claimable(now) && reward.remaining >= n => {
                    reward.remaining -= n;
                    Ok(1)
                }
                _ => Ok(0),
            }
        })
    }
}

impl CodeRepository for MemoryRepository {
    fn search_codes(&self, reward_id: RewardId) -> BoxFuture<'_, PoolResult<Vec<Code>>> {
        Box::pin(async move {
            let mut codes: Vec<Code> = self
                .codes
                .iter()
                .filter(|c| c.reward_id == reward_id)
                .map(|c| c.value().clone())
                .collect();
            codes.sort_by(|a, b| a.code.cmp(&b.code));
            Ok(codes)
        })
    }

    fn mark_code_consumed<'a>(&'a self, code: &'a str, now: i64) -> BoxFuture<'a, PoolResult<u64>> {
        Box::pin(async move {
            let mut record = self
                .codes
                .get_mut(code)
                .ok_or_else(|| PoolError::NotFound(format!("code {}", code)))?;
            if !record.is_available() {
                return Ok(0);
            }
            record.status = CodeStatus::Consumed;
            record.updated_at = now;
            Ok(1)
        })
    }

    fn insert_code<'a>(&'a self, reward_id: RewardId, code: &'a str) -> BoxFuture<'a, PoolResult<bool>> {
        Box::pin(async move {
            if code.trim().is_empty() {
                return Err(PoolError::InvalidArgument("code cannot be empty".to_string()));
            }
            Ok(self.add_code(reward_id, code))
        })
    }
}
