use crate::backend::{Cache, Store};
use crate::cache::retry::RetryPolicy;
use crate::core::error::{BackendError, EngineError};
use crate::query::plan::Query;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Cache-aside query execution with retry.
///
/// A query's rows are looked up in the cache under [`Query::cache_key`]; on a
/// miss they are fetched from the store and written back with the caller's
/// expiry. Any store or cache failure re-runs the whole lookup according to
/// the [`RetryPolicy`].
pub struct CachedExecutor {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    retry: RetryPolicy,
}

impl CachedExecutor {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, retry: RetryPolicy) -> Self {
        Self {
            store,
            cache,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Start a batch whose writes all expire at `expire_at`.
    pub fn batch(&self, expire_at: DateTime<Utc>) -> Batch<'_> {
        Batch {
            executor: self,
            expire_at,
        }
    }

    /// Return the rows for `query`, from the cache when present.
    ///
    /// Only fails when a bounded retry policy runs out of attempts.
    pub async fn execute(
        &self,
        query: &Query,
        expire_at: DateTime<Utc>,
    ) -> Result<Vec<Value>, EngineError> {
        let mut failures = 0u32;
        loop {
            match self.attempt(query, expire_at).await {
                Ok(rows) => return Ok(rows),
                Err(source) => {
                    failures += 1;
                    if !self.retry.allows_retry(failures) {
                        return Err(EngineError::BackendExhausted {
                            attempts: failures,
                            source,
                        });
                    }
                    let delay = self.retry.delay(failures);
                    log::warn!(
                        "attempt {} for `{}` failed, retrying in {:?}: {}",
                        failures,
                        query.sql(),
                        delay,
                        source
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        query: &Query,
        expire_at: DateTime<Utc>,
    ) -> Result<Vec<Value>, BackendError> {
        let key = query.cache_key();

        if let Some(cached) = self.cache.get(&key).await? {
            match serde_json::from_str::<Vec<Value>>(&cached) {
                Ok(rows) => {
                    log::debug!("cache hit ({} rows) for `{}`", rows.len(), query.sql());
                    return Ok(rows);
                }
                Err(e) => log::warn!("discarding unreadable cache entry for `{}`: {}", query.sql(), e),
            }
        }

        let rows = self.store.run(query).await?;
        log::debug!("cache miss, fetched {} rows for `{}`", rows.len(), query.sql());
        self.cache
            .set(&key, &serde_json::to_string(&rows)?, expire_at)
            .await?;
        Ok(rows)
    }
}

/// Queries issued on behalf of one request, sharing one expiry.
pub struct Batch<'a> {
    executor: &'a CachedExecutor,
    expire_at: DateTime<Utc>,
}

impl Batch<'_> {
    pub fn expire_at(&self) -> DateTime<Utc> {
        self.expire_at
    }

    pub async fn run(&self, query: &Query) -> Result<Vec<Value>, EngineError> {
        self.executor.execute(query, self.expire_at).await
    }
}
