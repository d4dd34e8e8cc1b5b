//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// # use esox_connectionpool::PoolMetrics;
/// # fn show(metrics: &PoolMetrics) {
/// let exported = metrics.export();
/// println!("live: {}", exported["live_connections"]);
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetrics {
    /// Connections currently created and not yet destroyed
    pub live_connections: usize,

    /// Connections parked in the idle queue
    pub idle_connections: usize,

    /// Connections held by callers
    pub in_use_connections: usize,

    /// Configured cap on live connections
    pub max_size: usize,

    /// Live connections relative to the cap (0.0 to 1.0)
    pub utilization: f64,

    /// Connections opened through the connector
    pub connections_created: usize,

    /// Connections destroyed for any reason
    pub connections_destroyed: usize,

    /// Connections handed to callers
    pub total_acquired: usize,

    /// Connections returned to the idle queue
    pub total_released: usize,

    /// Stale idle connections destroyed on acquisition
    pub idle_evictions: usize,

    /// Released connections shed to shrink toward the minimum
    pub shrink_evictions: usize,

    /// Acquisitions that failed because the pool stayed at capacity
    pub exhausted_events: usize,

    /// Failed connector `connect` calls
    pub connect_failures: usize,

    /// Failed connector `disconnect` calls (swallowed)
    pub disconnect_failures: usize,

    /// Dispatcher retries on a fresh connection
    pub retries: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("live_connections".to_string(), self.live_connections.to_string());
        metrics.insert("idle_connections".to_string(), self.idle_connections.to_string());
        metrics.insert("in_use_connections".to_string(), self.in_use_connections.to_string());
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("connections_created".to_string(), self.connections_created.to_string());
        metrics.insert("connections_destroyed".to_string(), self.connections_destroyed.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("idle_evictions".to_string(), self.idle_evictions.to_string());
        metrics.insert("shrink_evictions".to_string(), self.shrink_evictions.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("connect_failures".to_string(), self.connect_failures.to_string());
        metrics.insert("disconnect_failures".to_string(), self.disconnect_failures.to_string());
        metrics.insert("retries".to_string(), self.retries.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus the given tags. Fails if a
    /// tag is not a valid Prometheus label name.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connectionpool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let metrics = PoolMetrics { live_connections: 3, max_size: 10, ..Default::default() };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&metrics, "orders", Some(&tags)).unwrap();
    /// assert!(output.contains("connpool_connections_live"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let registry = Registry::new_custom(Some("connpool".to_string()), Some(labels))?;

        let gauges = [
            ("connections_live", "Current live connections", metrics.live_connections),
            ("connections_idle", "Current idle connections", metrics.idle_connections),
            (
                "connections_in_use",
                "Current connections held by callers",
                metrics.in_use_connections,
            ),
            ("connections_max", "Configured maximum connections", metrics.max_size),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::new("utilization", "Live connections relative to the maximum")?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("connections_created_total", "Connections opened", metrics.connections_created),
            ("connections_destroyed_total", "Connections destroyed", metrics.connections_destroyed),
            ("acquired_total", "Connections handed to callers", metrics.total_acquired),
            ("released_total", "Connections returned to the idle queue", metrics.total_released),
            ("idle_evictions_total", "Stale idle connections destroyed", metrics.idle_evictions),
            ("shrink_evictions_total", "Connections shed on release", metrics.shrink_evictions),
            ("exhausted_total", "Acquisitions failed at capacity", metrics.exhausted_events),
            ("connect_failures_total", "Failed connection attempts", metrics.connect_failures),
            ("disconnect_failures_total", "Failed disconnects", metrics.disconnect_failures),
            ("retries_total", "Dispatcher retries", metrics.retries),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub connections_created: AtomicUsize,
    pub connections_destroyed: AtomicUsize,
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub idle_evictions: AtomicUsize,
    pub shrink_evictions: AtomicUsize,
    pub exhausted_events: AtomicUsize,
    pub connect_failures: AtomicUsize,
    pub disconnect_failures: AtomicUsize,
    pub retries: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, live: usize, idle: usize, max_size: usize) -> PoolMetrics {
        let utilization = if max_size > 0 {
            live as f64 / max_size as f64
        } else {
            0.0
        };

        PoolMetrics {
            live_connections: live,
            idle_connections: idle,
            in_use_connections: live.saturating_sub(idle),
            max_size,
            utilization,
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_destroyed: self.connections_destroyed.load(Ordering::Relaxed),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            idle_evictions: self.idle_evictions.load(Ordering::Relaxed),
            shrink_evictions: self.shrink_evictions.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            disconnect_failures: self.disconnect_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
