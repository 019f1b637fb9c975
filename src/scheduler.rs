use crate::clock::Clock;
use crate::service::PrizeService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Background task that runs the plan feeder on a fixed interval.
///
/// A tick that overruns the interval delays the next one instead of queueing
/// a burst, so ticks never overlap.
pub struct FeederTask {
    handle: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FeederTask {
    pub fn spawn(service: Arc<PrizeService>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "FeederTask started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = &mut shutdown_rx => {
                        info!("FeederTask received shutdown signal");
                        break;
                    }

                    _ = ticker.tick() => {
                        if let Err(e) = service.tick(clock.now()).await {
                            error!(error = %e, "Feeder tick failed");
                        }
                    }
                }
            }

            info!("FeederTask shut down");
        });

        Self {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Signal shutdown and wait for the current tick to finish.
    pub async fn join(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "FeederTask panicked");
            }
        }
    }
}

impl Drop for FeederTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::metrics::Metrics;
    use crate::plan::{ReleaseEvent, ReleasePlan};
    use crate::planner::Planner;
    use crate::repository::{MemoryRepository, Reward};
    use crate::store::MemoryStore;

    const NOW: i64 = 1_700_000_000;

    #[tokio::test(start_paused = true)]
    async fn test_task_feeds_until_shutdown() {
        let repo = Arc::new(MemoryRepository::new());
        let plan = ReleasePlan::from_events(vec![
            ReleaseEvent { due_at: NOW, quantity: 4 },
            ReleaseEvent { due_at: NOW + 3_600, quantity: 9 },
        ]);
        repo.insert_reward(Reward {
            id: 1,
            total: 13,
            remaining: 13,
            time_begin: NOW - 60,
            time_end: NOW + 86_400,
            period_days: 1,
            plan: plan.encode().unwrap(),
            ..Reward::default()
        });

        let mut clock = MockClock::new();
        clock.expect_now().return_const(NOW);
        let clock: Arc<dyn Clock> = Arc::new(clock);

        let service = Arc::new(PrizeService::new(
            repo.clone(),
            repo.clone(),
            Arc::new(MemoryStore::new()),
            Duration::from_secs(1),
            Planner::default(),
            Arc::clone(&clock),
            Arc::new(Metrics::new()),
        ));

        let task = FeederTask::spawn(Arc::clone(&service), Duration::from_secs(60), clock);
        tokio::time::sleep(Duration::from_secs(150)).await;
        task.join().await;

        // Only the first event is due at the mocked time, however many ticks ran.
        assert_eq!(service.pool_count(1).await.unwrap(), 4);
        let ticks = service
            .metrics()
            .feeder
            .ticks
            .load(std::sync::atomic::Ordering::Relaxed);
        assert!(ticks >= 2);
    }
}
