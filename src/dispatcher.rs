//! Borrow-call-return dispatch with a single retry on known transient errors

use crate::connection::PooledConnection;
use crate::connector::Connector;
use crate::errors::PoolError;
use crate::pool::ConnectionPool;

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::debug;

/// Future returned by an operation borrowing a raw connection for `'c`
pub type OperationFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Retry policy for [`Dispatcher::invoke`]
///
/// # Examples
///
/// ```
/// use esox_connectionpool::DispatcherConfiguration;
///
/// let config = DispatcherConfiguration::new()
///     .with_retryable_error("broken pipe")
///     .with_retryable_error("server has gone away");
///
/// assert!(config.is_retryable("write failed: Broken pipe (os error 32)".to_lowercase().as_str()));
/// assert!(!config.is_retryable("syntax error"));
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatcherConfiguration {
    /// An error is retryable iff its message contains one of these
    pub retryable_errors: Vec<String>,

    /// Ping a connection whose operation failed and keep it if it answers
    pub ping_on_failure: bool,
}

impl DispatcherConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retryable_error(mut self, pattern: impl Into<String>) -> Self {
        self.retryable_errors.push(pattern.into());
        self
    }

    pub fn with_retryable_errors<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_ping_on_failure(mut self, enabled: bool) -> Self {
        self.ping_on_failure = enabled;
        self
    }

    pub fn is_retryable(&self, message: &str) -> bool {
        self.retryable_errors
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }
}

#[derive(Error, Debug)]
pub enum DispatchError<E> {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Operation failed: {0}")]
    Operation(E),
}

/// Runs operations against pooled connections
///
/// Every invocation borrows a connection, runs the operation and returns the
/// connection on success. A failed operation's connection is destroyed; if
/// the error message matches a retryable pattern the operation runs once
/// more on a fresh connection.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_connectionpool::{
///     ConnectionPool, Connector, Dispatcher, DispatcherConfiguration, PoolConfiguration,
/// };
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Connector for Greeter {
///     type Connection = String;
///     type Config = String;
///     type Error = std::io::Error;
///
///     async fn connect(&self, name: &String) -> Result<String, std::io::Error> {
///         Ok(name.clone())
///     }
///
///     async fn disconnect(&self, _connection: String) -> Result<(), std::io::Error> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = PoolConfiguration::default();
/// let pool = ConnectionPool::new(Greeter, "world".to_string(), config).unwrap();
/// let retry = DispatcherConfiguration::new().with_retryable_error("broken pipe");
/// let dispatcher = Dispatcher::new(pool, retry);
///
/// let greeting = dispatcher
///     .invoke(|name| {
///         Box::pin(async move { Ok::<_, std::io::Error>(format!("hello {name}")) })
///     })
///     .await
///     .unwrap();
/// assert_eq!(greeting, "hello world");
/// # }
/// ```
pub struct Dispatcher<C: Connector> {
    pool: ConnectionPool<C>,
    config: DispatcherConfiguration,
}

impl<C: Connector> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(pool: ConnectionPool<C>, config: DispatcherConfiguration) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn config(&self) -> &DispatcherConfiguration {
        &self.config
    }

    /// Run `operation` on a pooled connection, retrying once on a retryable failure
    pub async fn invoke<T, E, F>(&self, mut operation: F) -> Result<T, DispatchError<E>>
    where
        F: for<'c> FnMut(&'c mut C::Connection) -> OperationFuture<'c, T, E> + Send,
        T: Send,
        E: Display + Send,
    {
        let mut connection = self.pool.get_connection().await?;
        let outcome = operation(&mut *connection).await;
        let err = match outcome {
            Ok(value) => {
                self.give_back(connection).await;
                return Ok(value);
            }
            Err(err) => err,
        };

        self.handle_failed(connection).await;
        let message = err.to_string();
        if !self.config.is_retryable(&message) {
            return Err(DispatchError::Operation(err));
        }

        self.pool.shared().record_retry();
        debug!(error = %message, "retrying operation on a fresh connection");

        let mut connection = self.pool.get_connection().await?;
        let outcome = operation(&mut *connection).await;
        match outcome {
            Ok(value) => {
                self.give_back(connection).await;
                Ok(value)
            }
            Err(err) => {
                self.handle_failed(connection).await;
                Err(DispatchError::Operation(err))
            }
        }
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await
    }

    async fn give_back(&self, connection: PooledConnection<C>) {
        if let Err(err) = connection.release().await {
            debug!(error = %err, "connection destroyed after successful operation");
        }
    }

    async fn handle_failed(&self, mut connection: PooledConnection<C>) {
        if self.config.ping_on_failure && connection.ping().await {
            self.give_back(connection).await;
            return;
        }
        connection.discard().await;
    }
}
