use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const RUNS: &str = "runs";
pub const REPOSITORIES: &str = "repositories";
pub const BACKUPS: &str = "backups";
pub const COMMITTED: &str = "committed";
pub const PULL_REQUESTS: &str = "pull_requests";
pub const RESTORES: &str = "restores";

/// Counter key for failures in `stage`
pub fn failed_key(stage: &str) -> String {
    format!("failed.{}", stage.to_lowercase())
}

/// Collects and tracks pipeline metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    started: Instant,
    counters: Arc<RwLock<HashMap<String, u64>>>,
    timers: Arc<RwLock<HashMap<String, Duration>>>,
}

/// Point-in-time copy of every metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub counters: BTreeMap<String, u64>,
    /// Last recorded duration per timer, in milliseconds
    pub timers_ms: BTreeMap<String, u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new metrics collector
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Arc::new(RwLock::new(HashMap::new())),
            timers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Increments a counter metric by 1
    pub async fn increment(&self, key: &str) {
        let mut counters = self.counters.write().await;
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        debug!("Incremented counter {}: {}", key, value);
    }

    /// Records the latest duration of a timed step
    pub async fn record_time(&self, key: &str, duration: Duration) {
        let mut timers = self.timers.write().await;
        timers.insert(key.to_string(), duration);
        debug!("Recorded timer {}: {:?}", key, duration);
    }

    /// Gets the current value of a counter metric
    pub async fn get_counter(&self, key: &str) -> Option<u64> {
        let counters = self.counters.read().await;
        counters.get(key).cloned()
    }

    /// Gets the current value of a timer metric
    pub async fn get_timer(&self, key: &str) -> Option<Duration> {
        let timers = self.timers.read().await;
        timers.get(key).cloned()
    }

    /// Copies every metric
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read().await;
        let timers = self.timers.read().await;
        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            counters: counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            timers_ms: timers
                .iter()
                .map(|(k, v)| (k.clone(), v.as_millis() as u64))
                .collect(),
        }
    }

    /// Logs every counter
    pub async fn report(&self) {
        let snapshot = self.snapshot().await;
        info!("=== Metrics Report ===");
        for (k, v) in &snapshot.counters {
            info!("  {}: {}", k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters() {
        let metrics = Metrics::new();

        metrics.increment(COMMITTED).await;
        metrics.increment(COMMITTED).await;
        metrics.increment(&failed_key("Generated")).await;

        assert_eq!(metrics.get_counter(COMMITTED).await, Some(2));
        assert_eq!(metrics.get_counter("failed.generated").await, Some(1));
        assert_eq!(metrics.get_counter(RUNS).await, None);
    }

    #[tokio::test]
    async fn test_snapshot_includes_timers() {
        let metrics = Metrics::new();
        metrics.record_time("stage.analyzed", Duration::from_millis(1500)).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.timers_ms.get("stage.analyzed"), Some(&1500));
        assert!(snapshot.counters.is_empty());
    }
}
