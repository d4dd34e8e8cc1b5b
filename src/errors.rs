//! Error types for the connection pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Connection pool exhausted after waiting {wait_time:?} ({live} live connections)")]
    Exhausted { wait_time: Duration, live: usize },

    #[error("Failed to create connection: {0}")]
    ConnectFailed(String),

    #[error("Connection pool is closed")]
    Closed,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),
}

impl PoolError {
    /// Whether the error means the pool ran out of capacity
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_carries_context() {
        let err = PoolError::Exhausted {
            wait_time: Duration::from_secs(3),
            live: 10,
        };
        let message = err.to_string();
        assert!(message.contains("3s"));
        assert!(message.contains("10 live"));
        assert!(err.is_exhausted());
        assert!(!PoolError::Closed.is_exhausted());
    }
}
