//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Callback receiving every connector error swallowed while destroying a connection
pub type DisconnectHook = fn(&dyn std::error::Error);

/// Idle queue backend used by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueKind {
    /// Waiters are suspended on the runtime until a connection or a slot frees up
    #[default]
    Blocking,

    /// Waiters poll the queue every millisecond until their budget runs out
    Polling,
}

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use esox_connectionpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_min_size(2)
///     .with_max_size(20)
///     .with_acquire_wait_time(Duration::from_secs(3))
///     .with_idle_timeout(Duration::from_secs(60));
///
/// assert_eq!(config.max_size, 20);
/// assert_eq!(config.effective_release_buffer(), 9);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfiguration {
    /// Number of connections the pool creates eagerly before it ever blocks
    pub min_size: usize,

    /// Hard cap on live connections (idle + in use)
    pub max_size: usize,

    /// Maximum time `get_connection` waits for an idle connection
    pub acquire_wait_time: Duration,

    /// Idle connections older than this are destroyed instead of handed out
    pub idle_timeout: Duration,

    /// Headroom above `min_size` tolerated before a release sheds its connection
    pub release_buffer: Option<usize>,

    /// Idle queue backend
    pub queue_kind: QueueKind,

    /// Bound on waiting for the release gate before the release is retried
    pub release_gate_timeout: Duration,

    /// Bound on pushing a released connection onto the idle queue
    pub release_push_timeout: Duration,

    /// Observer for swallowed disconnect failures
    #[cfg_attr(feature = "serde", serde(skip))]
    pub disconnect_hook: Option<DisconnectHook>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_wait_time: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(120),
            release_buffer: None,
            queue_kind: QueueKind::Blocking,
            release_gate_timeout: Duration::from_millis(10),
            release_push_timeout: Duration::from_millis(1),
            disconnect_hook: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of connections kept warm
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set the maximum number of live connections
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set how long an acquisition may block
    pub fn with_acquire_wait_time(mut self, wait: Duration) -> Self {
        self.acquire_wait_time = wait;
        self
    }

    /// Set the idle timeout after which a parked connection is stale
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the shrink headroom above `min_size`
    ///
    /// A buffer of zero sheds every released connection while the pool holds
    /// more than `min_size` connections and another one is already idle.
    ///
    /// ```
    /// use esox_connectionpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new()
    ///     .with_min_size(1)
    ///     .with_max_size(10)
    ///     .with_release_buffer(0);
    ///
    /// assert_eq!(config.shrink_threshold(), 1);
    /// ```
    pub fn with_release_buffer(mut self, buffer: usize) -> Self {
        self.release_buffer = Some(buffer);
        self
    }

    /// Select the idle queue backend
    pub fn with_queue_kind(mut self, kind: QueueKind) -> Self {
        self.queue_kind = kind;
        self
    }

    /// Set the release gate wait bound
    pub fn with_release_gate_timeout(mut self, timeout: Duration) -> Self {
        self.release_gate_timeout = timeout;
        self
    }

    /// Set the bound for pushing a released connection back
    pub fn with_release_push_timeout(mut self, timeout: Duration) -> Self {
        self.release_push_timeout = timeout;
        self
    }

    /// Install an observer for swallowed disconnect failures
    pub fn with_disconnect_hook(mut self, hook: DisconnectHook) -> Self {
        self.disconnect_hook = Some(hook);
        self
    }

    /// Release buffer in effect: the configured one, or half the min/max range rounded up
    pub fn effective_release_buffer(&self) -> usize {
        self.release_buffer
            .unwrap_or_else(|| self.max_size.saturating_sub(self.min_size).div_ceil(2))
    }

    /// Live count above which a release may shed its connection
    pub fn shrink_threshold(&self) -> usize {
        self.min_size.saturating_add(self.effective_release_buffer())
    }

    /// Check the bounds are consistent
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_size must be at least 1".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfiguration(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}
