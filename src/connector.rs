//! Connector capability consumed by the pool

use async_trait::async_trait;

/// Creates, tears down and validates one kind of backend connection
///
/// The pool only ever calls [`connect`](Connector::connect) and
/// [`disconnect`](Connector::disconnect). `reset` and `ping` are exposed to
/// callers through [`PooledConnection`](crate::PooledConnection) and used by
/// the dispatcher when ping-on-failure is enabled.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_connectionpool::Connector;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Connector for Echo {
///     type Connection = String;
///     type Config = String;
///     type Error = std::io::Error;
///
///     async fn connect(&self, config: &String) -> Result<String, std::io::Error> {
///         Ok(config.clone())
///     }
///
///     async fn disconnect(&self, _connection: String) -> Result<(), std::io::Error> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Raw backend handle
    type Connection: Send + 'static;

    /// Settings passed to every `connect` call
    type Config: Send + Sync + 'static;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection
    async fn connect(&self, config: &Self::Config) -> Result<Self::Connection, Self::Error>;

    /// Close a connection; the pool logs and swallows any error
    async fn disconnect(&self, connection: Self::Connection) -> Result<(), Self::Error>;

    /// Bring a connection back to a clean session state
    async fn reset(&self, _connection: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Check whether a connection is still usable
    async fn ping(&self, _connection: &mut Self::Connection) -> bool {
        true
    }
}
