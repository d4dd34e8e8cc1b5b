//! In-memory connector for unit tests

use crate::config::PoolConfiguration;
use crate::connector::Connector;
use crate::pool::ConnectionPool;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct MockError(pub String);

#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    pub healthy: bool,
    pub resets: usize,
}

#[derive(Default)]
pub struct MockConnector {
    next_id: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    connect_delay_ms: AtomicU64,
}

impl MockConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Config = String;
    type Error = MockError;

    async fn connect(&self, _config: &String) -> Result<MockConnection, MockError> {
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(MockError("connection refused".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            healthy: true,
            resets: 0,
        })
    }

    async fn disconnect(&self, _connection: MockConnection) -> Result<(), MockError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(MockError("connection reset by peer".to_string()));
        }
        Ok(())
    }

    async fn reset(&self, connection: &mut MockConnection) -> Result<(), MockError> {
        connection.resets += 1;
        Ok(())
    }

    async fn ping(&self, connection: &mut MockConnection) -> bool {
        connection.healthy
    }
}

pub fn mock_pool(config: PoolConfiguration) -> ConnectionPool<MockConnector> {
    ConnectionPool::new(MockConnector::default(), "mock://".to_string(), config)
        .expect("valid test configuration")
}
