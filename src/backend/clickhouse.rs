//! ClickHouse store over the HTTP interface.

use crate::backend::Store;
use crate::core::error::BackendError;
use crate::query::plan::Query;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Store adapter that POSTs query text to ClickHouse and reads
/// newline-delimited JSON rows back.
pub struct ClickHouseStore {
    url: String,
    user: String,
    password: String,
    database: String,
    http_client: Client,
}

impl ClickHouseStore {
    /// Create a store for the HTTP endpoint at `url`
    /// (e.g. `http://localhost:8123`).
    pub fn new(url: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            http_client: Client::new(),
        }
    }

    /// Text actually sent: the query plus an explicit output format.
    fn request_body(query: &Query) -> String {
        format!("{} FORMAT JSONEachRow", query.sql())
    }
}

/// Split a JSONEachRow body into one JSON value per non-blank line.
fn parse_json_lines(body: &str) -> Result<Vec<Value>, BackendError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(BackendError::from))
        .collect()
}

#[async_trait]
impl Store for ClickHouseStore {
    async fn run(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let response = self
            .http_client
            .post(&self.url)
            .query(&[("database", self.database.as_str())])
            .basic_auth(&self.user, Some(&self.password))
            .body(Self::request_body(query))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                service: "clickhouse",
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        parse_json_lines(&body)
    }
}
