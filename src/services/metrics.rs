use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for observability
#[derive(Debug, Default)]
pub struct Metrics {
    /// Completed sync cycles
    pub sync_cycles: AtomicU64,
    /// Snapshots fetched from providers
    pub snapshots_fetched: AtomicU64,
    /// Times the adapter fell through to a fallback provider
    pub provider_fallbacks: AtomicU64,
    /// Sync cycles where every provider failed
    pub sync_failures: AtomicU64,
    /// Working set reloads
    pub working_set_reloads: AtomicU64,
    /// Trigger events emitted by the evaluator
    pub alerts_triggered: AtomicU64,
    /// Notifications delivered
    pub notifications_sent: AtomicU64,
    /// Notifications that failed to deliver
    pub notifications_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sync_cycles(&self) {
        self.sync_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_snapshots_fetched(&self, n: u64) {
        self.snapshots_fetched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_provider_fallbacks(&self) {
        self.provider_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sync_failures(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_working_set_reloads(&self) {
        self.working_set_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_triggered(&self) {
        self.alerts_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counters as a formatted status block
    pub fn summary(&self) -> String {
        format!(
            "cycles={} snapshots={} fallbacks={} sync_failures={} reloads={} triggered={} sent={} send_failures={}",
            self.sync_cycles.load(Ordering::Relaxed),
            self.snapshots_fetched.load(Ordering::Relaxed),
            self.provider_fallbacks.load(Ordering::Relaxed),
            self.sync_failures.load(Ordering::Relaxed),
            self.working_set_reloads.load(Ordering::Relaxed),
            self.alerts_triggered.load(Ordering::Relaxed),
            self.notifications_sent.load(Ordering::Relaxed),
            self.notifications_failed.load(Ordering::Relaxed),
        )
    }
}
