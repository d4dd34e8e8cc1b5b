//! Core connection pool implementation

use crate::config::PoolConfiguration;
use crate::connection::{IdleConnection, PooledConnection};
use crate::connector::Connector;
use crate::errors::{PoolError, PoolResult};
use crate::guard::{LiveSlot, release_slot};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::queue::{IdleQueue, QueueError, idle_queue};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// State shared between the pool handle and every borrowed connection
pub(crate) struct PoolShared<C: Connector> {
    pub(crate) connector: C,
    connect_config: C::Config,
    config: PoolConfiguration,
    live: AtomicUsize,
    idle: Box<dyn IdleQueue<IdleConnection<C::Connection>>>,
    release_gate: Semaphore,
    closed: AtomicBool,
    metrics: MetricsTracker,
}

impl<C: Connector> PoolShared<C> {
    fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Claim a live slot if the count is below `limit`
    fn try_reserve_below(&self, limit: usize) -> Option<LiveSlot<'_>> {
        let limit = limit.min(self.config.max_size);
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < limit).then_some(live + 1)
            })
            .ok()
            .map(|_| LiveSlot::new(&self.live))
    }

    /// Open a connection; the caller holds its slot
    async fn open(&self) -> PoolResult<C::Connection> {
        match self.connector.connect(&self.connect_config).await {
            Ok(connection) => {
                MetricsTracker::increment(&self.metrics.connections_created);
                debug!(live = self.live_count(), "opened connection");
                Ok(connection)
            }
            Err(err) => {
                MetricsTracker::increment(&self.metrics.connect_failures);
                warn!(error = %err, "failed to open connection");
                Err(PoolError::ConnectFailed(err.to_string()))
            }
        }
    }

    async fn connect_reserved(
        self: &Arc<Self>,
        slot: LiveSlot<'_>,
    ) -> PoolResult<PooledConnection<C>> {
        let connection = self.open().await?;
        slot.cancel();
        MetricsTracker::increment(&self.metrics.total_acquired);
        Ok(PooledConnection::new(connection, Instant::now(), Arc::clone(self)))
    }

    pub(crate) async fn create(self: &Arc<Self>) -> PoolResult<PooledConnection<C>> {
        self.ensure_open()?;
        let Some(slot) = self.try_reserve_below(self.config.max_size) else {
            return Err(PoolError::Exhausted {
                wait_time: Duration::ZERO,
                live: self.live_count(),
            });
        };
        self.connect_reserved(slot).await
    }

    fn ensure_open(&self) -> PoolResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    pub(crate) async fn acquire(self: &Arc<Self>) -> PoolResult<PooledConnection<C>> {
        loop {
            self.ensure_open()?;

            // Warm up to the floor before ever touching the queue
            if let Some(slot) = self.try_reserve_below(self.config.min_size) {
                return self.connect_reserved(slot).await;
            }

            // Grow rather than block while under the cap
            if self.idle.is_empty() {
                if let Some(slot) = self.try_reserve_below(self.config.max_size) {
                    return self.connect_reserved(slot).await;
                }
            }

            let idle = match self.idle.pop(self.config.acquire_wait_time).await {
                Ok(idle) => idle,
                Err(QueueError::Closed) => return Err(PoolError::Closed),
                Err(QueueError::Timeout) => {
                    if let Some(slot) = self.try_reserve_below(self.config.max_size) {
                        return self.connect_reserved(slot).await;
                    }
                    MetricsTracker::increment(&self.metrics.exhausted_events);
                    let live = self.live_count();
                    warn!(
                        wait_time = ?self.config.acquire_wait_time,
                        live,
                        "connection pool exhausted"
                    );
                    return Err(PoolError::Exhausted {
                        wait_time: self.config.acquire_wait_time,
                        live,
                    });
                }
            };

            // The last idle connection is handed out even when stale
            if idle.is_stale(self.config.idle_timeout) && !self.idle.is_empty() {
                MetricsTracker::increment(&self.metrics.idle_evictions);
                debug!(idle_for = ?idle.last_active.elapsed(), "evicting stale idle connection");
                self.destroy(idle.connection).await;
                continue;
            }

            MetricsTracker::increment(&self.metrics.total_acquired);
            trace!(idle = self.idle.len(), "reusing idle connection");
            return Ok(PooledConnection::from_idle(idle, Arc::clone(self)));
        }
    }

    /// Decide under the release gate whether a released connection is surplus
    ///
    /// A surplus connection has its slot given up here, before the gate is
    /// released, so concurrent releasers see the lowered count.
    fn claim_shed(&self, threshold: usize) -> bool {
        !self.idle.is_empty()
            && self
                .live
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                    (live > threshold).then(|| live - 1)
                })
                .is_ok()
    }

    pub(crate) async fn release(
        &self,
        connection: C::Connection,
        created_at: Instant,
    ) -> PoolResult<bool> {
        // The connection's own slot, given back if this future is dropped
        let slot = LiveSlot::new(&self.live);

        loop {
            if self.closed.load(Ordering::Acquire) {
                self.retire(slot, connection).await;
                return Err(PoolError::Closed);
            }

            if self.idle.is_full() {
                self.retire(slot, connection).await;
                return Ok(false);
            }

            let threshold = self.config.shrink_threshold();
            if self.live_count() > threshold {
                let gate = tokio::time::timeout(
                    self.config.release_gate_timeout,
                    self.release_gate.acquire(),
                )
                .await;
                let permit = match gate {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        self.retire(slot, connection).await;
                        return Err(PoolError::Closed);
                    }
                    Err(_) => {
                        trace!("release gate busy, retrying release");
                        continue;
                    }
                };
                let shed = self.claim_shed(threshold);
                drop(permit);

                if shed {
                    slot.cancel();
                    MetricsTracker::increment(&self.metrics.shrink_evictions);
                    debug!(live = self.live_count(), "shedding released connection");
                    self.disconnect(connection).await;
                    return Ok(false);
                }
            }
            break;
        }

        let idle = IdleConnection::new(connection, created_at);
        match self.idle.push(idle, self.config.release_push_timeout).await {
            Ok(()) => {
                slot.cancel();
                MetricsTracker::increment(&self.metrics.total_released);
                Ok(true)
            }
            Err(rejected) => {
                self.retire(slot, rejected.item.connection).await;
                match rejected.reason {
                    QueueError::Closed => Err(PoolError::Closed),
                    QueueError::Timeout => Ok(false),
                }
            }
        }
    }

    /// Give up the connection's slot and disconnect it
    pub(crate) async fn destroy(&self, connection: C::Connection) {
        release_slot(&self.live);
        self.disconnect(connection).await;
    }

    async fn retire(&self, slot: LiveSlot<'_>, connection: C::Connection) {
        drop(slot);
        self.disconnect(connection).await;
    }

    async fn disconnect(&self, connection: C::Connection) {
        MetricsTracker::increment(&self.metrics.connections_destroyed);
        if let Err(err) = self.connector.disconnect(connection).await {
            MetricsTracker::increment(&self.metrics.disconnect_failures);
            warn!(error = %err, "ignoring disconnect failure");
            if let Some(hook) = self.config.disconnect_hook {
                hook(&err);
            }
        }
    }

    /// Drop a connection that can no longer be disconnected
    pub(crate) fn abandon(&self, connection: C::Connection) {
        release_slot(&self.live);
        MetricsTracker::increment(&self.metrics.connections_destroyed);
        warn!("connection dropped without a running tokio runtime, skipping disconnect");
        drop(connection);
    }

    pub(crate) fn record_retry(&self) {
        MetricsTracker::increment(&self.metrics.retries);
    }
}

/// Bounded async connection pool
///
/// Keeps at least `min_size` connections once warmed up, never more than
/// `max_size`, and blocks acquisitions for at most `acquire_wait_time`.
/// Cloning the pool yields another handle to the same connections.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_connectionpool::{ConnectionPool, Connector, PoolConfiguration};
///
/// struct Counter;
///
/// #[async_trait]
/// impl Connector for Counter {
///     type Connection = u32;
///     type Config = ();
///     type Error = std::io::Error;
///
///     async fn connect(&self, _config: &()) -> Result<u32, std::io::Error> {
///         Ok(7)
///     }
///
///     async fn disconnect(&self, _connection: u32) -> Result<(), std::io::Error> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = ConnectionPool::new(Counter, (), PoolConfiguration::default()).unwrap();
///
/// let conn = pool.get_connection().await.unwrap();
/// assert_eq!(*conn, 7);
/// assert!(pool.release_connection(conn).await.unwrap());
/// assert_eq!(pool.idle_count(), 1);
///
/// pool.close().await;
/// assert_eq!(pool.live_count(), 0);
/// # }
/// ```
pub struct ConnectionPool<C: Connector> {
    shared: Arc<PoolShared<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an empty pool; connections are opened on demand
    pub fn new(
        connector: C,
        connect_config: C::Config,
        config: PoolConfiguration,
    ) -> PoolResult<Self> {
        config.validate()?;

        let shared = PoolShared {
            connector,
            connect_config,
            idle: idle_queue(config.queue_kind, config.max_size),
            config,
            live: AtomicUsize::new(0),
            release_gate: Semaphore::new(1),
            closed: AtomicBool::new(false),
            metrics: MetricsTracker::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Borrow a connection, creating or waiting for one as needed
    pub async fn get_connection(&self) -> PoolResult<PooledConnection<C>> {
        self.shared.acquire().await
    }

    /// Open a new connection directly, bypassing the idle queue
    ///
    /// Fails with [`PoolError::Exhausted`] without waiting when the pool is
    /// at `max_size`.
    pub async fn create_connection(&self) -> PoolResult<PooledConnection<C>> {
        self.shared.create().await
    }

    /// Return a borrowed connection; see [`PooledConnection::release`]
    pub async fn release_connection(&self, connection: PooledConnection<C>) -> PoolResult<bool> {
        connection.release().await
    }

    /// Destroy a borrowed connection; disconnect failures are swallowed
    pub async fn remove_connection(&self, connection: PooledConnection<C>) {
        connection.discard().await
    }

    /// Pre-open up to `count` connections into the idle queue
    ///
    /// Returns how many were parked. Stops at `max_size` or at the first
    /// connect failure, which is returned.
    pub async fn warmup(&self, count: usize) -> PoolResult<usize> {
        let shared = &self.shared;
        let mut parked = 0;

        for _ in 0..count.min(shared.config.max_size) {
            shared.ensure_open()?;
            let Some(slot) = shared.try_reserve_below(shared.config.max_size) else {
                break;
            };
            let connection = shared.open().await?;
            let idle = IdleConnection::new(connection, Instant::now());
            if let Err(rejected) = shared.idle.push(idle, Duration::ZERO).await {
                shared.retire(slot, rejected.item.connection).await;
                break;
            }
            slot.cancel();
            parked += 1;
        }

        debug!(parked, "warmed up connection pool");
        Ok(parked)
    }

    /// Close the pool and destroy every idle connection
    ///
    /// Connections still borrowed are destroyed when their holders release
    /// them. Calling this again is a no-op.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained = self.shared.idle.close();
        let count = drained.len();
        for _ in 0..count {
            release_slot(&self.shared.live);
        }
        for idle in drained {
            self.shared.disconnect(idle.connection).await;
        }
        debug!(destroyed = count, live = self.live_count(), "closed connection pool");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Connections created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.shared.live_count()
    }

    /// Connections parked in the idle queue
    pub fn idle_count(&self) -> usize {
        self.shared.idle.len()
    }

    /// Connections currently borrowed
    pub fn in_use_count(&self) -> usize {
        self.live_count().saturating_sub(self.idle_count())
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.shared.config
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.live_count(),
            self.idle_count(),
            self.shared.config.max_size,
            self.shared.metrics.exhausted_events.load(Ordering::Relaxed),
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.shared
            .metrics
            .get_metrics(self.live_count(), self.idle_count(), self.shared.config.max_size)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    pub(crate) fn shared(&self) -> &Arc<PoolShared<C>> {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueKind;
    use crate::testing::{MockConnection, MockConnector, mock_pool};

    #[tokio::test]
    async fn test_warms_up_to_min_without_queue() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(3).with_max_size(5));

        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();
        let c = pool.get_connection().await.unwrap();

        assert_eq!(pool.live_count(), 3);
        assert_eq!(pool.connector().connects(), 3);
        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
    }

    #[tokio::test]
    async fn test_round_trip_reuses_connection() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(1).with_max_size(4));

        let conn = pool.get_connection().await.unwrap();
        let id = conn.id;
        let first_active = conn.last_active_time();
        assert!(pool.release_connection(conn).await.unwrap());
        assert_eq!(pool.idle_count(), 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let conn = pool.get_connection().await.unwrap();
        assert_eq!(conn.id, id);
        assert!(conn.last_active_time() > first_active);
        assert_eq!(pool.connector().connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_wait() {
        let wait = Duration::from_millis(200);
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(2)
                .with_acquire_wait_time(wait),
        );

        let _a = pool.get_connection().await.unwrap();
        let _b = pool.get_connection().await.unwrap();

        let started = Instant::now();
        let err = pool.get_connection().await.unwrap_err();
        assert!(started.elapsed() >= wait);
        assert_eq!(err, PoolError::Exhausted { wait_time: wait, live: 2 });
        assert_eq!(pool.connector().connects(), 2);
        assert_eq!(pool.get_metrics().exhausted_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_released_connection() {
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(1)
                .with_acquire_wait_time(Duration::from_secs(1)),
        );

        let held = pool.get_connection().await.unwrap();
        let held_id = held.id;
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_connection().await.map(|conn| conn.id) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(held.release().await.unwrap());

        assert_eq!(waiter.await.unwrap().unwrap(), held_id);
        assert_eq!(pool.connector().connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_evicted_when_others_idle() {
        let idle_timeout = Duration::from_secs(120);
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(4)
                .with_release_buffer(3)
                .with_idle_timeout(idle_timeout),
        );

        let first = pool.get_connection().await.unwrap();
        let second = pool.get_connection().await.unwrap();
        let stale_id = first.id;
        pool.release_connection(first).await.unwrap();

        tokio::time::advance(idle_timeout + Duration::from_secs(1)).await;
        pool.release_connection(second).await.unwrap();
        assert_eq!(pool.idle_count(), 2);

        let conn = pool.get_connection().await.unwrap();
        assert_ne!(conn.id, stale_id);
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.connector().disconnects(), 1);
        assert_eq!(pool.get_metrics().idle_evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_idle_connection_kept_even_if_stale() {
        let idle_timeout = Duration::from_secs(120);
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(4)
                .with_idle_timeout(idle_timeout),
        );

        let conn = pool.get_connection().await.unwrap();
        let id = conn.id;
        pool.release_connection(conn).await.unwrap();

        tokio::time::advance(idle_timeout * 2).await;
        let conn = pool.get_connection().await.unwrap();
        assert_eq!(conn.id, id);
        assert_eq!(pool.connector().disconnects(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_rolls_back_live_count() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(1).with_max_size(1));
        pool.connector().set_fail_connect(true);

        for _ in 0..3 {
            let err = pool.get_connection().await.unwrap_err();
            assert!(matches!(err, PoolError::ConnectFailed(ref msg) if msg.contains("refused")));
        }
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.get_metrics().connect_failures, 3);

        pool.connector().set_fail_connect(false);
        assert!(pool.get_connection().await.is_ok());
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn test_release_sheds_surplus_when_idle_present() {
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(4)
                .with_release_buffer(0),
        );

        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();
        assert_eq!(pool.live_count(), 2);

        assert!(pool.release_connection(a).await.unwrap());
        assert!(!pool.release_connection(b).await.unwrap());

        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.get_metrics().shrink_evictions, 1);
        assert_eq!(pool.connector().disconnects(), 1);
    }

    #[tokio::test]
    async fn test_release_keeps_connection_within_buffer() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(1).with_max_size(5));

        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();
        assert!(pool.release_connection(a).await.unwrap());
        assert!(pool.release_connection(b).await.unwrap());
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.live_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_swallows_disconnect_failure() {
        fn hook(err: &dyn std::error::Error) {
            assert!(err.to_string().contains("reset by peer"));
        }

        let pool = mock_pool(PoolConfiguration::new().with_disconnect_hook(hook));
        pool.connector().set_fail_disconnect(true);

        let conn = pool.get_connection().await.unwrap();
        pool.remove_connection(conn).await;

        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.get_metrics().disconnect_failures, 1);
    }

    #[tokio::test]
    async fn test_create_connection_respects_cap() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(0).with_max_size(1));

        let conn = pool.create_connection().await.unwrap();
        let err = pool.create_connection().await.unwrap_err();
        assert!(err.is_exhausted());
        conn.discard().await;
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test]
    async fn test_warmup_parks_connections() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(0).with_max_size(3));

        assert_eq!(pool.warmup(5).await.unwrap(), 3);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.live_count(), 3);

        let _conn = pool.get_connection().await.unwrap();
        assert_eq!(pool.connector().connects(), 3);
    }

    #[tokio::test]
    async fn test_close_destroys_idle_and_rejects_later_use() {
        for kind in [QueueKind::Blocking, QueueKind::Polling] {
            let pool = mock_pool(
                PoolConfiguration::new()
                    .with_min_size(1)
                    .with_max_size(4)
                    .with_queue_kind(kind),
            );

            let held = pool.get_connection().await.unwrap();
            pool.warmup(2).await.unwrap();
            assert_eq!(pool.live_count(), 3);

            pool.close().await;
            pool.close().await;
            assert!(pool.is_closed());
            assert_eq!(pool.live_count(), 1);
            assert_eq!(pool.connector().disconnects(), 2);

            assert_eq!(pool.release_connection(held).await, Err(PoolError::Closed));
            assert_eq!(pool.live_count(), 0);
            assert_eq!(pool.get_connection().await.unwrap_err(), PoolError::Closed);
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_returns_to_pool() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(1).with_max_size(2));

        {
            let _conn = pool.get_connection().await.unwrap();
        }

        for _ in 0..100 {
            if pool.idle_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_and_ping_passthrough() {
        let pool = mock_pool(PoolConfiguration::default());

        let mut conn = pool.get_connection().await.unwrap();
        conn.reset().await.unwrap();
        assert_eq!(conn.resets, 1);
        assert!(conn.ping().await);

        conn.healthy = false;
        assert!(!conn.ping().await);
    }

    #[tokio::test]
    async fn test_polling_backend_serves_waiters() {
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(1)
                .with_queue_kind(QueueKind::Polling)
                .with_acquire_wait_time(Duration::from_secs(2)),
        );

        let held = pool.get_connection().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_connection().await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        held.release().await.unwrap();

        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let result = ConnectionPool::new(
            MockConnector::default(),
            "mock://".to_string(),
            PoolConfiguration::new().with_min_size(3).with_max_size(1),
        );
        assert!(matches!(result, Err(PoolError::InvalidConfiguration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_connect_gives_back_slot() {
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(0)
                .with_max_size(1)
                .with_acquire_wait_time(Duration::from_millis(100)),
        );
        pool.connector().set_connect_delay(Duration::from_millis(500));

        let attempt = tokio::time::timeout(Duration::from_millis(10), pool.get_connection()).await;
        assert!(attempt.is_err());
        assert_eq!(pool.live_count(), 0);

        pool.connector().set_connect_delay(Duration::ZERO);
        let conn = pool.get_connection().await.unwrap();
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.connector().connects(), 1);
        drop(conn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_release_gives_back_slot() {
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(4)
                .with_release_buffer(0),
        );

        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();
        let gate = pool.shared().release_gate.acquire().await.unwrap();

        let attempt =
            tokio::time::timeout(Duration::from_millis(50), pool.release_connection(a)).await;
        assert!(attempt.is_err());
        assert_eq!(pool.live_count(), 1);

        drop(gate);
        assert!(pool.release_connection(b).await.unwrap());
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_connection_dropped_during_runtime_shutdown_frees_slot() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let pool = mock_pool(PoolConfiguration::new().with_min_size(1).with_max_size(1));

        let conn = runtime.block_on(pool.get_connection()).unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        // The handle still resolves, but its runtime no longer runs tasks
        let _entered = handle.enter();
        drop(conn);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.get_metrics().connections_destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_retries_until_gate_frees() {
        let pool = mock_pool(
            PoolConfiguration::new()
                .with_min_size(1)
                .with_max_size(4)
                .with_release_buffer(0),
        );

        let a = pool.get_connection().await.unwrap();
        let b = pool.get_connection().await.unwrap();
        let gate = pool.shared().release_gate.acquire().await.unwrap();

        let release = tokio::spawn(a.release());
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(!release.is_finished());
        assert_eq!(pool.live_count(), 2);

        drop(gate);
        assert!(release.await.unwrap().unwrap());
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.live_count(), 2);

        assert!(!b.release().await.unwrap());
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.connector().disconnects(), 1);
    }

    #[tokio::test]
    async fn test_release_into_closed_queue_destroys_connection() {
        for kind in [QueueKind::Blocking, QueueKind::Polling] {
            let pool = mock_pool(
                PoolConfiguration::new()
                    .with_min_size(1)
                    .with_max_size(4)
                    .with_queue_kind(kind),
            );

            let conn = pool.get_connection().await.unwrap();
            assert!(pool.shared().idle.close().is_empty());

            assert_eq!(pool.release_connection(conn).await, Err(PoolError::Closed));
            assert_eq!(pool.live_count(), 0, "{kind:?}");
            assert_eq!(pool.connector().disconnects(), 1, "{kind:?}");
        }
    }

    #[tokio::test]
    async fn test_release_into_full_queue_destroys_connection() {
        let pool = mock_pool(PoolConfiguration::new().with_min_size(1).with_max_size(2));
        let conn = pool.get_connection().await.unwrap();

        for id in [100, 101] {
            let filler = MockConnection {
                id,
                healthy: true,
                resets: 0,
            };
            let parked = pool
                .shared()
                .idle
                .push(IdleConnection::new(filler, Instant::now()), Duration::ZERO)
                .await;
            assert!(parked.is_ok());
        }

        assert!(!pool.release_connection(conn).await.unwrap());
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.connector().disconnects(), 1);
    }
}
