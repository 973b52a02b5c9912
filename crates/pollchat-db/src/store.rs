use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::error;

use crate::Database;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

/// Async handle to the database.
///
/// SQLite calls block, so each call runs on the blocking pool and is bounded
/// by a timeout. A call that times out keeps running to completion in the
/// background; only the caller stops waiting.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    timeout: Duration,
}

impl Store {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self {
            db: Arc::new(db),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(StoreError::Timeout(self.timeout)),
            Ok(Err(e)) => {
                error!("spawn_blocking join error: {}", e);
                Err(StoreError::Join(e.to_string()))
            }
            Ok(Ok(result)) => result.map_err(StoreError::Db),
        }
    }
}
