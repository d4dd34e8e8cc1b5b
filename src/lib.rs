//! # EsoxSolutions.ConnectionPool
//!
//! Async, thread-safe connection pool for expensive backend handles
//! (database sessions, RPC sockets, ...) shared by many concurrent tasks.
//!
//! ## Features
//!
//! - Pluggable [`Connector`] creating, closing, resetting and pinging connections
//! - Eager warm-up to `min_size`, hard cap at `max_size`
//! - Blocking acquisition bounded by `acquire_wait_time`
//! - Idle-timeout eviction of stale connections
//! - Race-free shrink toward `min_size` on release
//! - Two idle queue backends: scheduler-blocking and busy-polling
//! - [`Dispatcher`] running closures on pooled connections with a single
//!   retry on configured transient errors
//! - Health monitoring and metrics, with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use esox_connectionpool::{ConnectionPool, Connector, PoolConfiguration};
//!
//! struct Sessions;
//!
//! #[async_trait]
//! impl Connector for Sessions {
//!     type Connection = Vec<String>;
//!     type Config = ();
//!     type Error = std::io::Error;
//!
//!     async fn connect(&self, _config: &()) -> Result<Vec<String>, std::io::Error> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn disconnect(&self, _session: Vec<String>) -> Result<(), std::io::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let pool = ConnectionPool::new(Sessions, (), PoolConfiguration::default()).unwrap();
//! {
//!     let mut session = pool.get_connection().await.unwrap();
//!     session.push("SELECT 1".to_string());
//!     session.release().await.unwrap();
//! }
//! assert_eq!(pool.idle_count(), 1);
//! # }
//! ```

mod config;
mod connection;
mod connector;
mod dispatcher;
mod errors;
mod guard;
mod health;
mod metrics;
mod pool;
mod queue;

#[cfg(test)]
mod testing;

pub use config::{DisconnectHook, PoolConfiguration, QueueKind};
pub use connection::PooledConnection;
pub use connector::Connector;
pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfiguration, OperationFuture};
pub use errors::{PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::ConnectionPool;
pub use queue::{ChannelQueue, IdleQueue, POLL_INTERVAL, PollingQueue, QueueError, Rejected};
