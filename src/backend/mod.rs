//! Contracts for the two external services the engine talks to.
//!
//! Implemented by:
//! - [`memory::MemoryStore`] / [`memory::MemoryCache`]: in-process, for tests and demos
//! - [`clickhouse::ClickHouseStore`]: ClickHouse HTTP interface
//! - [`redis::RedisCache`]: Redis over RESP

use crate::core::error::BackendError;
use crate::query::plan::Query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub mod clickhouse;
pub mod memory;
pub mod redis;

/// Columnar store answering aggregate queries.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run `query` and return its rows as JSON values.
    async fn run(&self, query: &Query) -> Result<Vec<Value>, BackendError>;
}

/// Key-value cache with absolute expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key` until `expire_at`.
    async fn set(&self, key: &str, value: &str, expire_at: DateTime<Utc>) -> Result<(), BackendError>;
}
