pub mod cache;
pub mod clock;
pub mod codes;
pub mod config;
pub mod error;
pub mod feeder;
pub mod gate;
pub mod metrics;
pub mod plan;
pub mod planner;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod store;

pub use cache::{Cache, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codes::{CodeCache, CodeCounts, RefreshReport};
pub use config::{CliArgs, Config};
pub use error::{PoolError, PoolResult};
pub use feeder::{PlanFeeder, TickReport};
pub use gate::{CreditOutcome, InventoryGate};
pub use metrics::Metrics;
pub use plan::{ReleaseEvent, ReleasePlan};
pub use planner::{HourWeights, Planner};
pub use repository::{CachedRewards, MemoryRepository, Reward, RewardId};
pub use scheduler::FeederTask;
pub use service::{PlanOutcome, PrizeService};
pub use store::{KvStore, StoreProvider};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Run the allocation service until Ctrl-C.
pub async fn run(config: Config, seed: Option<PathBuf>) -> Result<()> {
    tracing::info!(operation = "startup", message = "prize-pool starting");
    tracing::debug!(config = ?config, "Configuration loaded");

    let metrics = Arc::new(Metrics::new());
    let provider = StoreProvider::new(config.store.clone());
    let store = provider
        .get()
        .await
        .context("Failed to connect to the pool store")?;

    let repo = Arc::new(match seed {
        Some(ref path) => MemoryRepository::from_seed_file(path)
            .with_context(|| format!("Failed to load seed file {}", path.display()))?,
        None => MemoryRepository::new(),
    });
    let rewards = Arc::new(CachedRewards::new(repo.clone(), &config.cache));
    let planner = Planner::from_config(&config.planner).context("Invalid planner configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let service = Arc::new(PrizeService::new(
        rewards,
        repo.clone(),
        store,
        provider.op_timeout(),
        planner,
        Arc::clone(&clock),
        Arc::clone(&metrics),
    ));

    if config.feeder.reset_pools_on_start {
        service
            .reset_all_pools()
            .await
            .context("Failed to reset pool counters")?;
    }

    let ids = repo.reward_ids();
    let planned = service.reset_plans(&ids).await;
    for &id in &ids {
        if let Err(e) = service.refresh_codes(id).await {
            tracing::warn!(reward_id = id, error = %e, "Failed to load code set");
        }
    }
    tracing::info!(
        operation = "plans_ready",
        rewards = ids.len(),
        planned,
    );

    let feeder = FeederTask::spawn(
        Arc::clone(&service),
        Duration::from_secs(config.feeder.interval_secs),
        clock,
    );

    let stop = Arc::new(AtomicBool::new(false));
    let metrics_task = (config.logging.metrics_interval_secs > 0).then(|| {
        metrics.spawn_periodic_logging(config.logging.metrics_interval_secs, Arc::clone(&stop))
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!(operation = "shutdown", message = "Ctrl-C received");

    feeder.join().await;
    stop.store(true, Ordering::Relaxed);
    if let Some(task) = metrics_task {
        task.abort();
    }

    metrics.log_full_summary();
    provider
        .shutdown()
        .await
        .context("Failed to flush the pool store")?;

    Ok(())
}
