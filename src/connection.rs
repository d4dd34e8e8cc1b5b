//! Borrowed and idle connection wrappers

use crate::connector::Connector;
use crate::errors::PoolResult;
use crate::pool::PoolShared;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TAKEN: &str = "Connection already returned to the pool";

/// A connection parked in the idle queue
pub(crate) struct IdleConnection<T> {
    pub connection: T,
    pub created_at: Instant,
    pub last_active: Instant,
}

impl<T> IdleConnection<T> {
    pub fn new(connection: T, created_at: Instant) -> Self {
        Self {
            connection,
            created_at,
            last_active: Instant::now(),
        }
    }

    pub fn is_stale(&self, idle_timeout: Duration) -> bool {
        self.last_active.elapsed() >= idle_timeout
    }
}

/// A connection borrowed from the pool
///
/// Hand it back with [`release`](PooledConnection::release), or destroy it
/// with [`discard`](PooledConnection::discard) when it is known to be broken.
/// Dropping it without either releases it on the current tokio runtime.
pub struct PooledConnection<C: Connector> {
    connection: Option<C::Connection>,
    created_at: Instant,
    last_active: Instant,
    pool: Arc<PoolShared<C>>,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(
        connection: C::Connection,
        created_at: Instant,
        pool: Arc<PoolShared<C>>,
    ) -> Self {
        Self {
            connection: Some(connection),
            created_at,
            last_active: Instant::now(),
            pool,
        }
    }

    pub(crate) fn from_idle(
        idle: IdleConnection<C::Connection>,
        pool: Arc<PoolShared<C>>,
    ) -> Self {
        Self::new(idle.connection, idle.created_at, pool)
    }

    /// When this connection last entered active use
    pub fn last_active_time(&self) -> Instant {
        self.last_active
    }

    /// When the connector opened this connection
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Return the connection to the pool
    ///
    /// `Ok(false)` means the pool chose to destroy it instead of parking it.
    pub async fn release(mut self) -> PoolResult<bool> {
        let connection = self.connection.take().expect(TAKEN);
        self.pool.release(connection, self.created_at).await
    }

    /// Destroy the connection instead of returning it
    pub async fn discard(mut self) {
        let connection = self.connection.take().expect(TAKEN);
        self.pool.destroy(connection).await;
    }

    /// Reset the session through the connector
    pub async fn reset(&mut self) -> Result<(), C::Error> {
        let connection = self.connection.as_mut().expect(TAKEN);
        self.pool.connector.reset(connection).await
    }

    /// Check the connection through the connector
    pub async fn ping(&mut self) -> bool {
        let connection = self.connection.as_mut().expect(TAKEN);
        self.pool.connector.ping(connection).await
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref().expect(TAKEN)
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect(TAKEN)
    }
}

impl<C> fmt::Debug for PooledConnection<C>
where
    C: Connector,
    C::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.connection)
            .field("created_at", &self.created_at)
            .field("last_active", &self.last_active)
            .finish()
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let pending = DetachedRelease {
                pool: Arc::clone(&self.pool),
                connection: Some(connection),
                created_at: self.created_at,
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(pending.run());
                }
                Err(_) => drop(pending),
            }
        }
    }
}

/// Release of a dropped connection running on a spawned task
///
/// A task that never runs, e.g. one spawned while the runtime shuts down,
/// abandons the connection so its slot is still given back.
struct DetachedRelease<C: Connector> {
    pool: Arc<PoolShared<C>>,
    connection: Option<C::Connection>,
    created_at: Instant,
}

impl<C: Connector> DetachedRelease<C> {
    async fn run(mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = self.pool.release(connection, self.created_at).await;
        }
    }
}

impl<C: Connector> Drop for DetachedRelease<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.abandon(connection);
        }
    }
}
