use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

/// Metrics for reward claims
#[derive(Debug, Default)]
pub struct ClaimMetrics {
    /// Total number of claim attempts
    pub attempts: AtomicU64,
    /// Claims that took a unit and were recorded against the reward
    pub granted: AtomicU64,
    /// Claims that found the pool empty (counter went negative)
    pub overdrawn: AtomicU64,
    /// Claims that won a unit but failed to decrement the remaining quantity
    pub fail_closed: AtomicU64,
    /// Claims that failed on the store (error or timeout)
    pub store_errors: AtomicU64,
}

impl ClaimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_granted(&self, reward_id: u64) {
        self.granted.fetch_add(1, Ordering::Relaxed);
        trace!(claim = "granted", reward_id);
    }

    pub fn record_overdrawn(&self, reward_id: u64) {
        self.overdrawn.fetch_add(1, Ordering::Relaxed);
        trace!(claim = "overdrawn", reward_id);
    }

    pub fn record_fail_closed(&self, reward_id: u64) {
        self.fail_closed.fetch_add(1, Ordering::Relaxed);
        warn!(claim = "fail_closed", reward_id);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of attempts that were granted, as a percentage
    pub fn grant_rate(&self) -> f64 {
        let attempts = self.attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 0.0;
        }
        let granted = self.granted.load(Ordering::Relaxed);
        (granted as f64 / attempts as f64) * 100.0
    }

    pub fn log_summary(&self) {
        info!(
            operation = "claim_metrics_summary",
            attempts = self.attempts.load(Ordering::Relaxed),
            granted = self.granted.load(Ordering::Relaxed),
            overdrawn = self.overdrawn.load(Ordering::Relaxed),
            fail_closed = self.fail_closed.load(Ordering::Relaxed),
            store_errors = self.store_errors.load(Ordering::Relaxed),
            grant_rate_pct = self.grant_rate(),
        );
    }
}

/// Metrics for the plan feeder
#[derive(Debug, Default)]
pub struct FeederMetrics {
    pub ticks: AtomicU64,
    /// Units moved from plans into pools
    pub units_credited: AtomicU64,
    /// Compensating increments issued after a short credit
    pub compensations: AtomicU64,
    /// Plans consumed down to nothing
    pub plans_drained: AtomicU64,
    pub decode_errors: AtomicU64,
    pub credit_errors: AtomicU64,
    /// Truncated plans that could not be written back
    pub write_failures: AtomicU64,
    /// Total time spent in ticks (nanoseconds)
    pub tick_latency_ns: AtomicU64,
}

impl FeederMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self, credited: u64, latency: Duration) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.units_credited.fetch_add(credited, Ordering::Relaxed);
        self.tick_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        trace!(
            feeder_op = "tick",
            credited,
            latency_us = latency.as_micros() as u64
        );
    }

    pub fn record_compensation(&self) {
        self.compensations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_plan_drained(&self) {
        self.plans_drained.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_credit_error(&self) {
        self.credit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Average tick duration in milliseconds
    pub fn avg_tick_ms(&self) -> f64 {
        let ticks = self.ticks.load(Ordering::Relaxed);
        if ticks == 0 {
            return 0.0;
        }
        let total_ns = self.tick_latency_ns.load(Ordering::Relaxed);
        (total_ns as f64 / ticks as f64) / 1_000_000.0
    }

    pub fn log_summary(&self) {
        info!(
            operation = "feeder_metrics_summary",
            ticks = self.ticks.load(Ordering::Relaxed),
            units_credited = self.units_credited.load(Ordering::Relaxed),
            compensations = self.compensations.load(Ordering::Relaxed),
            plans_drained = self.plans_drained.load(Ordering::Relaxed),
            decode_errors = self.decode_errors.load(Ordering::Relaxed),
            credit_errors = self.credit_errors.load(Ordering::Relaxed),
            write_failures = self.write_failures.load(Ordering::Relaxed),
            avg_tick_ms = self.avg_tick_ms(),
        );
    }
}

/// Metrics for the single-use code cache
#[derive(Debug, Default)]
pub struct CodeMetrics {
    pub claims: AtomicU64,
    /// Claims that found the code set empty
    pub empty: AtomicU64,
    pub imports: AtomicU64,
    pub refreshes: AtomicU64,
    pub staged: AtomicU64,
    pub stage_failures: AtomicU64,
    /// Popped codes whose record could not be marked consumed
    pub mark_failures: AtomicU64,
    /// Popped codes whose record was already consumed
    pub already_spent: AtomicU64,
}

impl CodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_claim(&self, found: bool) {
        if found {
            self.claims.fetch_add(1, Ordering::Relaxed);
        } else {
            self.empty.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_import(&self) {
        self.imports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self, staged: u64, failed: u64) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        self.staged.fetch_add(staged, Ordering::Relaxed);
        self.stage_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_mark_failure(&self) {
        self.mark_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_spent(&self) {
        self.already_spent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_summary(&self) {
        info!(
            operation = "code_metrics_summary",
            claims = self.claims.load(Ordering::Relaxed),
            empty = self.empty.load(Ordering::Relaxed),
            imports = self.imports.load(Ordering::Relaxed),
            refreshes = self.refreshes.load(Ordering::Relaxed),
            staged = self.staged.load(Ordering::Relaxed),
            stage_failures = self.stage_failures.load(Ordering::Relaxed),
            mark_failures = self.mark_failures.load(Ordering::Relaxed),
            already_spent = self.already_spent.load(Ordering::Relaxed),
        );
    }
}

/// Combined metrics for the entire system
pub struct Metrics {
    pub claims: Arc<ClaimMetrics>,
    pub feeder: Arc<FeederMetrics>,
    pub codes: Arc<CodeMetrics>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            claims: Arc::new(ClaimMetrics::new()),
            feeder: Arc::new(FeederMetrics::new()),
            codes: Arc::new(CodeMetrics::new()),
            start_time: Instant::now(),
        }
    }

    /// Log a complete metrics summary
    pub fn log_full_summary(&self) {
        info!(
            "=== prize-pool Metrics Summary ({:.0}s) ===",
            self.elapsed().as_secs_f64()
        );
        self.claims.log_summary();
        self.feeder.log_summary();
        self.codes.log_summary();
        info!("============================================");
    }

    /// Get elapsed time since metrics creation
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create a periodic logging background task
    pub fn spawn_periodic_logging(
        self: &Arc<Self>,
        interval_secs: u64,
        stop: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if stop.load(Ordering::Relaxed) {
                    break;
                }

                metrics.claims.log_summary();
                metrics.feeder.log_summary();
                metrics.codes.log_summary();
            }
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_metrics() {
        let metrics = ClaimMetrics::new();

        metrics.record_attempt();
        metrics.record_granted(1);
        metrics.record_attempt();
        metrics.record_overdrawn(1);
        metrics.record_attempt();
        metrics.record_fail_closed(1);

        assert_eq!(metrics.attempts.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.granted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.overdrawn.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.fail_closed.load(Ordering::Relaxed), 1);
        assert!((metrics.grant_rate() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_feeder_metrics() {
        let metrics = FeederMetrics::new();
        assert_eq!(metrics.avg_tick_ms(), 0.0);

        metrics.record_tick(40, Duration::from_millis(10));
        metrics.record_tick(2, Duration::from_millis(30));
        metrics.record_plan_drained();

        assert_eq!(metrics.ticks.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.units_credited.load(Ordering::Relaxed), 42);
        assert_eq!(metrics.plans_drained.load(Ordering::Relaxed), 1);
        let avg = metrics.avg_tick_ms();
        assert!(avg > 19.0 && avg < 21.0);
    }

    #[test]
    fn test_code_metrics() {
        let metrics = CodeMetrics::new();
        metrics.record_claim(true);
        metrics.record_claim(false);
        metrics.record_refresh(10, 2);
        metrics.record_refresh(5, 0);

        assert_eq!(metrics.claims.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.empty.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.refreshes.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.staged.load(Ordering::Relaxed), 15);
        assert_eq!(metrics.stage_failures.load(Ordering::Relaxed), 2);
    }
}
