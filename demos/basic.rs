//! Basic usage examples for ConnectionPool

use async_trait::async_trait;
use esox_connectionpool::{ConnectionPool, Connector, PoolConfiguration, QueueKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Pretend TCP session to a key-value store
#[derive(Debug)]
struct Session {
    id: usize,
    addr: String,
}

#[derive(Default)]
struct SessionConnector {
    next_id: AtomicUsize,
}

#[async_trait]
impl Connector for SessionConnector {
    type Connection = Session;
    type Config = String;
    type Error = std::io::Error;

    async fn connect(&self, addr: &String) -> Result<Session, std::io::Error> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        println!("   connector: opened session {} to {}", id, addr);
        Ok(Session { id, addr: addr.clone() })
    }

    async fn disconnect(&self, session: Session) -> Result<(), std::io::Error> {
        println!("   connector: closed session {}", session.id);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.ConnectionPool - Basic Examples ===\n");

    // Example 1: Borrow and return
    borrow_and_return().await;

    // Example 2: Exhaustion
    exhaustion().await;

    // Example 3: Polling backend with concurrent tasks
    concurrent_polling().await;
}

fn pool(config: PoolConfiguration) -> ConnectionPool<SessionConnector> {
    ConnectionPool::new(SessionConnector::default(), "127.0.0.1:6379".to_string(), config)
        .expect("valid configuration")
}

async fn borrow_and_return() {
    println!("1. Borrow and return:");
    let pool = pool(PoolConfiguration::new().with_min_size(2).with_max_size(5));

    let session = pool.get_connection().await.unwrap();
    println!("   Got session {} to {}", session.id, session.addr);
    pool.release_connection(session).await.unwrap();

    let session = pool.get_connection().await.unwrap();
    println!("   Reused session {}", session.id);
    session.release().await.unwrap();

    let health = pool.get_health_status();
    println!("   Live: {}, idle: {}", health.live_connections, health.idle_connections);
    pool.close().await;
    println!();
}

async fn exhaustion() {
    println!("2. Exhaustion:");
    let pool = pool(
        PoolConfiguration::new()
            .with_min_size(1)
            .with_max_size(1)
            .with_acquire_wait_time(Duration::from_millis(100)),
    );

    let held = pool.get_connection().await.unwrap();
    match pool.get_connection().await {
        Ok(_) => println!("   Unexpectedly got a second session"),
        Err(e) => println!("   Error: {}", e),
    }
    held.release().await.unwrap();
    pool.close().await;
    println!();
}

async fn concurrent_polling() {
    println!("3. Concurrent tasks on the polling backend:");
    let pool = pool(
        PoolConfiguration::new()
            .with_min_size(1)
            .with_max_size(3)
            .with_queue_kind(QueueKind::Polling),
    );

    let mut handles = vec![];
    for task in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let session = pool.get_connection().await.unwrap();
            println!("   Task {} using session {}", task, session.id);
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.release().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    println!("\n   Metrics:");
    for (key, value) in pool.export_metrics() {
        println!("     {}: {}", key, value);
    }
    pool.close().await;
}
