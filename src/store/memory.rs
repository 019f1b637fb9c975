//! In-process store backend.
//!
//! Every primitive runs under a single dashmap shard guard, which gives it the
//! same all-or-nothing behaviour the remote backend gets from the server. An
//! optional JSON snapshot lets pool state survive a restart.

use super::KvStore;
use crate::error::{PoolError, PoolResult};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    hashes: HashMap<String, HashMap<String, i64>>,
    #[serde(default)]
    sets: HashMap<String, Vec<String>>,
}

/// Dashmap-backed implementation of [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    hashes: DashMap<String, HashMap<String, i64>>,
    sets: DashMap<String, HashSet<String>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from `path`, or start empty when the file does not exist yet.
    /// `flush` writes back to the same path.
    pub fn load_snapshot(path: &Path) -> PoolResult<Self> {
        let mut store = Self::new();
        store.snapshot_path = Some(path.to_path_buf());

        if !path.exists() {
            debug!(path = %path.display(), "No store snapshot found, starting empty");
            return Ok(store);
        }

        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        for (key, fields) in snapshot.hashes {
            store.hashes.insert(key, fields);
        }
        for (key, members) in snapshot.sets {
            store.sets.insert(key, members.into_iter().collect());
        }

        info!(
            operation = "snapshot_load",
            path = %path.display(),
            hashes = store.hashes.len(),
            sets = store.sets.len(),
        );
        Ok(store)
    }

    /// Write the current contents to `path` (write to a sibling file, then rename).
    pub fn save_snapshot(&self, path: &Path) -> PoolResult<()> {
        let snapshot = Snapshot {
            hashes: self
                .hashes
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            sets: self
                .sets
                .iter()
                .map(|e| (e.key().clone(), e.value().iter().cloned().collect()))
                .collect(),
        };
        let content = serde_json::to_string(&snapshot)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;

        debug!(path = %path.display(), "Store snapshot written");
        Ok(())
    }

    fn incr(&self, key: &str, field: &str, delta: i64) -> i64 {
        let mut fields = self.hashes.entry(key.to_string()).or_default();
        let value = fields.entry(field.to_string()).or_insert(0);
        *value += delta;
        *value
    }

    fn pop(&self, key: &str) -> Option<String> {
        let member = {
            let mut set = self.sets.get_mut(key)?;
            let member = set.iter().next().cloned()?;
            set.remove(&member);
            member
        };
        // Empty sets disappear, matching the remote backend.
        self.sets.remove_if(key, |_, set| set.is_empty());
        Some(member)
    }

    fn move_key(&self, from: &str, to: &str) -> PoolResult<()> {
        if let Some((_, set)) = self.sets.remove(from) {
            self.hashes.remove(to);
            self.sets.insert(to.to_string(), set);
            return Ok(());
        }
        if let Some((_, fields)) = self.hashes.remove(from) {
            self.sets.remove(to);
            self.hashes.insert(to.to_string(), fields);
            return Ok(());
        }
        Err(PoolError::NotFound(format!("no such key: {}", from)))
    }
}

impl KvStore for MemoryStore {
    fn hincr_by<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
        delta: i64,
    ) -> BoxFuture<'a, PoolResult<i64>> {
        Box::pin(async move { Ok(self.incr(key, field, delta)) })
    }

    fn hget<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, PoolResult<Option<i64>>> {
        Box::pin(async move {
            Ok(self
                .hashes
                .get(key)
                .and_then(|fields| fields.get(field).copied()))
        })
    }

    fn hset<'a>(&'a self, key: &'a str, field: &'a str, value: i64) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            self.hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value);
            Ok(())
        })
    }

    fn hdel<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            if let Some(mut fields) = self.hashes.get_mut(key) {
                fields.remove(field);
            }
            self.hashes.remove_if(key, |_, fields| fields.is_empty());
            Ok(())
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, PoolResult<bool>> {
        Box::pin(async move {
            Ok(self
                .sets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string()))
        })
    }

    fn spop<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<Option<String>>> {
        Box::pin(async move { Ok(self.pop(key)) })
    }

    fn scard<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<u64>> {
        Box::pin(async move { Ok(self.sets.get(key).map(|s| s.len() as u64).unwrap_or(0)) })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move { self.move_key(from, to) })
    }

    fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            self.hashes.remove(key);
            self.sets.remove(key);
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async move {
            match self.snapshot_path {
                Some(ref path) => self.save_snapshot(path),
                None => Ok(()),
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hincr_by_starts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.hincr_by("pool", "1", 5).await.unwrap(), 5);
        assert_eq!(store.hincr_by("pool", "1", -7).await.unwrap(), -2);
        assert_eq!(store.hget("pool", "1").await.unwrap(), Some(-2));
        assert_eq!(store.hget("pool", "2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hset_and_hdel() {
        let store = MemoryStore::new();
        store.hset("pool", "9", 40).await.unwrap();
        assert_eq!(store.hget("pool", "9").await.unwrap(), Some(40));

        store.hdel("pool", "9").await.unwrap();
        assert_eq!(store.hget("pool", "9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();
        assert!(store.sadd("codes", "A").await.unwrap());
        assert!(store.sadd("codes", "B").await.unwrap());
        assert!(!store.sadd("codes", "A").await.unwrap());
        assert_eq!(store.scard("codes").await.unwrap(), 2);

        let first = store.spop("codes").await.unwrap().unwrap();
        let second = store.spop("codes").await.unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.spop("codes").await.unwrap(), None);
        assert_eq!(store.scard("codes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rename_replaces_target() {
        let store = MemoryStore::new();
        store.sadd("live", "OLD").await.unwrap();
        store.sadd("staging", "NEW1").await.unwrap();
        store.sadd("staging", "NEW2").await.unwrap();

        store.rename("staging", "live").await.unwrap();

        assert_eq!(store.scard("live").await.unwrap(), 2);
        let mut members = vec![
            store.spop("live").await.unwrap().unwrap(),
            store.spop("live").await.unwrap().unwrap(),
        ];
        members.sort();
        assert_eq!(members, vec!["NEW1".to_string(), "NEW2".to_string()]);
        assert_eq!(store.scard("staging").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rename_missing_key_fails() {
        let store = MemoryStore::new();
        let result = store.rename("missing", "live").await;
        assert!(matches!(result, Err(PoolError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    store.hincr_by("pool", "1", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.hget("pool", "1").await.unwrap(), Some(10_000));
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::load_snapshot(&path).unwrap();
        store.hset("reward_pool", "3", 12).await.unwrap();
        store.sadd("reward_codes:{3}", "XYZ").await.unwrap();
        store.flush().await.unwrap();
        assert!(path.exists());

        let restored = MemoryStore::load_snapshot(&path).unwrap();
        assert_eq!(restored.hget("reward_pool", "3").await.unwrap(), Some(12));
        assert_eq!(
            restored.spop("reward_codes:{3}").await.unwrap(),
            Some("XYZ".to_string())
        );
    }

    #[test]
    fn test_corrupt_snapshot_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = MemoryStore::load_snapshot(&path);
        assert!(matches!(result, Err(PoolError::Parse(_))));
    }
}
