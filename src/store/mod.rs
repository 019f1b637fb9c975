//! Shared counter and set store.
//!
//! Everything the inventory gate and code cache need from the shared store is
//! expressed through [`KvStore`]: atomic hash-field increments for pool
//! counters and string sets for single-use codes. Correctness of concurrent
//! claims comes entirely from the atomicity of these primitives, so no
//! in-process lock is ever taken around them.

pub mod memory;
pub mod remote;
pub mod staged;

pub use memory::MemoryStore;
pub use remote::RedisStore;
pub use staged::{StagedSet, SwapOutcome};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{PoolError, PoolResult};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Atomic key/value primitives backing the pool counters and code sets.
///
/// Methods return boxed futures so the store can live behind `Arc<dyn KvStore>`.
pub trait KvStore: Send + Sync {
    /// Atomically add `delta` to a hash field and return the post-operation value.
    /// A missing field counts as 0.
    fn hincr_by<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
        delta: i64,
    ) -> BoxFuture<'a, PoolResult<i64>>;

    fn hget<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, PoolResult<Option<i64>>>;

    fn hset<'a>(&'a self, key: &'a str, field: &'a str, value: i64) -> BoxFuture<'a, PoolResult<()>>;

    fn hdel<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, PoolResult<()>>;

    /// Add a member to a set. Returns `true` if it was not already present.
    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, PoolResult<bool>>;

    /// Atomically remove and return an arbitrary member.
    fn spop<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<Option<String>>>;

    fn scard<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<u64>>;

    /// Atomically move `from` over `to`, replacing whatever `to` held.
    /// Fails with `NotFound` when `from` does not exist.
    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, PoolResult<()>>;

    fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<()>>;

    /// Persist whatever the backend keeps locally. Remote stores have nothing to do.
    fn flush(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn backend_name(&self) -> &'static str;
}

/// Run a store call under a deadline.
///
/// A call that times out is reported as failed; its effect on the store is
/// unknown, so callers must not retry only part of a multi-step sequence.
pub async fn timed<T, F>(op: &'static str, limit: Duration, fut: F) -> PoolResult<T>
where
    F: Future<Output = PoolResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PoolError::TimedOut(format!(
            "{} exceeded {}ms",
            op,
            limit.as_millis()
        ))),
    }
}

/// Owns the process-wide store handle.
///
/// The handle is built lazily on first use and exactly once, even when many
/// tasks race on that first use. `shutdown` flushes it.
pub struct StoreProvider {
    config: StoreConfig,
    handle: OnceCell<Arc<dyn KvStore>>,
}

impl StoreProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            handle: OnceCell::new(),
        }
    }

    /// Provider around an already constructed store.
    pub fn with_store(config: StoreConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            config,
            handle: OnceCell::new_with(Some(store)),
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.config.op_timeout_ms)
    }

    /// Get the shared store, constructing it on first call.
    pub async fn get(&self) -> PoolResult<Arc<dyn KvStore>> {
        let store = self
            .handle
            .get_or_try_init(|| async { connect(&self.config).await })
            .await?;
        Ok(Arc::clone(store))
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    /// Flush the store if it was ever constructed.
    pub async fn shutdown(&self) -> PoolResult<()> {
        if let Some(store) = self.handle.get() {
            debug!(backend = store.backend_name(), "Flushing store on shutdown");
            store.flush().await?;
        }
        Ok(())
    }
}

async fn connect(config: &StoreConfig) -> PoolResult<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.backend {
        StoreBackend::Memory => match config.snapshot_path {
            Some(ref path) => Arc::new(MemoryStore::load_snapshot(path)?),
            None => Arc::new(MemoryStore::new()),
        },
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.url).await?),
    };
    info!(
        operation = "store_connect",
        backend = store.backend_name(),
        "Store handle constructed"
    );
    Ok(store)
}
