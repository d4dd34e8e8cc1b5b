//! Health monitoring for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::HealthStatus;
///
/// let health = HealthStatus::new(2, 1, 10, 0);
/// assert!(health.is_healthy());
/// assert_eq!(health.in_use_connections, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Live connections relative to the cap (0.0 to 1.0)
    pub utilization: f64,

    /// Live connections (idle + in use)
    pub live_connections: usize,

    /// Idle connections
    pub idle_connections: usize,

    /// Connections held by callers
    pub in_use_connections: usize,

    /// Maximum live connections
    pub max_size: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(live: usize, idle: usize, max_size: usize, exhausted_events: usize) -> Self {
        let utilization = if max_size > 0 {
            live as f64 / max_size as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle == 0 && live >= max_size && max_size > 0 {
            warnings.push("All connections in use".to_string());
        }

        if exhausted_events > 0 {
            warnings.push(format!("Pool exhausted {} time(s)", exhausted_events));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            live_connections: live,
            idle_connections: idle,
            in_use_connections: live.saturating_sub(idle),
            max_size,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
