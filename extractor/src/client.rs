use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::{sleep, Instant};

/// One record of a query result, keyed by lower-cased column name.
pub type Row = Map<String, Value>;

/// Paginated access to the analytics query service.
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Executes `sql` and returns one page of its result records.
    async fn run(&self, sql: &str, page_number: u32) -> Result<Vec<Row>>;

    /// Page size the service applies to `run`. A page of exactly this many
    /// rows means more data may follow.
    fn page_size(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub page_size: usize,
    pub timeout_minutes: u64,
    pub ttl_minutes: u64,
    pub cached: bool,
    pub retry_interval_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            page_size: 100_000,
            timeout_minutes: 4,
            ttl_minutes: 60,
            cached: true,
            retry_interval_seconds: 1,
        }
    }
}

/// HTTP client for the query service: submits a query run, then polls the
/// run's result endpoint for one page at a time. With `cached` set, the
/// service resolves identical SQL to the same run for `ttl_minutes`, so
/// per-page submits do not recompute the query.
#[derive(Clone)]
pub struct Api {
    base: String,
    api_key: String,
    http: Client,
    cfg: ApiConfig,
}

#[derive(Serialize)]
struct CreateQueryReq<'a> {
    sql: &'a str,
    ttl_minutes: u64,
    cached: bool,
}

#[derive(Deserialize)]
struct CreateQueryRes {
    token: String,
}

#[derive(Deserialize)]
struct QueryResultRes {
    status: String,
    #[serde(default)]
    results: Vec<Row>,
    #[serde(default)]
    message: Option<String>,
}

impl Api {
    pub fn new(base: &str, api_key: &str, cfg: ApiConfig) -> Result<Self> {
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: Client::builder().build().context("build http client")?,
            cfg,
        })
    }

    async fn create_query(&self, sql: &str) -> Result<String> {
        let res = self
            .http
            .post(format!("{}/queries", self.base))
            .header("x-api-key", &self.api_key)
            .json(&CreateQueryReq {
                sql,
                ttl_minutes: self.cfg.ttl_minutes,
                cached: self.cfg.cached,
            })
            .send()
            .await
            .context("query submit send failed")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_else(|_| "<no body>".to_string());
            bail!("query submit HTTP {status}: {body}");
        }

        let created: CreateQueryRes = res.json().await.context("query submit decode failed")?;
        Ok(created.token)
    }

    async fn poll_results(&self, token: &str, page_number: u32) -> Result<Vec<Row>> {
        let deadline = Instant::now() + Duration::from_secs(self.cfg.timeout_minutes * 60);
        loop {
            let res = self
                .http
                .get(format!("{}/queries/{token}", self.base))
                .header("x-api-key", &self.api_key)
                .query(&[
                    ("pageNumber", page_number.to_string()),
                    ("pageSize", self.cfg.page_size.to_string()),
                ])
                .send()
                .await
                .context("query poll send failed")?;

            let status = res.status();
            if !status.is_success() {
                let body = res.text().await.unwrap_or_else(|_| "<no body>".to_string());
                bail!("query poll HTTP {status}: {body}");
            }

            let body: QueryResultRes = res.json().await.context("query poll decode failed")?;
            match body.status.as_str() {
                "finished" => return Ok(body.results),
                "queued" | "running" => {
                    if Instant::now() >= deadline {
                        bail!("query timed out after {} minutes", self.cfg.timeout_minutes);
                    }
                    sleep(Duration::from_secs(self.cfg.retry_interval_seconds)).await;
                }
                other => {
                    let message = body.message.unwrap_or_default();
                    bail!("query ended with status {other}: {message}");
                }
            }
        }
    }
}

#[async_trait]
impl QueryApi for Api {
    async fn run(&self, sql: &str, page_number: u32) -> Result<Vec<Row>> {
        let token = self.create_query(sql).await?;
        self.poll_results(&token, page_number).await
    }

    fn page_size(&self) -> usize {
        self.cfg.page_size
    }
}
