//! Dispatcher examples: running operations with automatic return and retry

use async_trait::async_trait;
use esox_connectionpool::{
    ConnectionPool, Connector, DispatchError, Dispatcher, DispatcherConfiguration,
    PoolConfiguration,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend session that drops every third query with a broken pipe
struct FlakySession {
    queries: usize,
}

impl FlakySession {
    async fn query(&mut self, sql: &str) -> Result<String, std::io::Error> {
        self.queries += 1;
        if self.queries % 3 == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        Ok(format!("rows for `{}`", sql))
    }
}

#[derive(Default)]
struct FlakyConnector {
    opened: AtomicUsize,
}

#[async_trait]
impl Connector for FlakyConnector {
    type Connection = FlakySession;
    type Config = ();
    type Error = std::io::Error;

    async fn connect(&self, _config: &()) -> Result<FlakySession, std::io::Error> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(FlakySession { queries: 0 })
    }

    async fn disconnect(&self, _session: FlakySession) -> Result<(), std::io::Error> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.ConnectionPool - Dispatcher ===\n");

    let pool = ConnectionPool::new(FlakyConnector::default(), (), PoolConfiguration::default())
        .expect("valid configuration");
    let retry = DispatcherConfiguration::new()
        .with_retryable_errors(["broken pipe", "server has gone away"]);
    let dispatcher = Dispatcher::new(pool, retry);

    for n in 0..6 {
        let sql = format!("SELECT {}", n);
        let result = dispatcher
            .invoke(|session| {
                let sql = sql.clone();
                Box::pin(async move { session.query(&sql).await })
            })
            .await;
        match result {
            Ok(rows) => println!("   {}", rows),
            Err(DispatchError::Operation(e)) => println!("   query failed: {}", e),
            Err(DispatchError::Pool(e)) => println!("   pool error: {}", e),
        }
    }

    let opened = dispatcher.pool().connector().opened.load(Ordering::Relaxed);
    println!("\n   Sessions opened: {}", opened);
    println!("   Retries: {}", dispatcher.pool().get_metrics().retries);
    dispatcher.close().await;
}
