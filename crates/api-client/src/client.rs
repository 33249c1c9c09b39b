use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time;
use tracing::{debug, warn};

use warbot_config::ApiConfig;
use warbot_core_types::ChainStatus;

use crate::decode::{self, AttackPage};
use crate::error::ApiError;
use crate::throttle::{compute_retry_delay, parse_retry_after, TokenBucketLimiter};

enum FetchFailure {
    Retry {
        error: ApiError,
        retry_after: Option<Duration>,
    },
    Fatal(ApiError),
}

/// Authenticated client for the game's v2 REST API. The key is scoped to
/// one faction, so no endpoint takes a faction id.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
    max_attempts: u32,
    retry_base_ms: u64,
    retry_max_ms: u64,
    retry_jitter_ms: u64,
    limiter: Option<Arc<TokenBucketLimiter>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            max_attempts: config.max_attempts.max(1),
            retry_base_ms: config.retry_base_ms,
            retry_max_ms: config.retry_max_ms,
            retry_jitter_ms: config.retry_jitter_ms,
            limiter: TokenBucketLimiter::new(config.rps_limit, config.rps_burst),
        })
    }

    /// One page of outgoing attacks, newest first. `cursor` is the `to`
    /// value advertised by the previous page's pagination links.
    pub async fn fetch_attack_page(&self, cursor: Option<i64>) -> Result<AttackPage, ApiError> {
        let mut query = vec![
            ("filters", "outgoing".to_string()),
            ("sort", "DESC".to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("to", cursor.to_string()));
        }
        let body = self
            .get_json("/faction/attacks", &query, "faction_attacks")
            .await?;
        let page = decode::decode_attack_page(&body);
        if page.skipped > 0 {
            debug!(skipped = page.skipped, "dropped malformed attack records");
        }
        Ok(page)
    }

    /// Start of the live ranked war, or `None` when the faction is not at
    /// war right now.
    pub async fn fetch_war_start(&self) -> Result<Option<i64>, ApiError> {
        let body = self.get_json("/faction/wars", &[], "faction_wars").await?;
        Ok(decode::decode_war_start(&body))
    }

    /// Current chain, or `None` when no chain is running.
    pub async fn fetch_chain_status(&self) -> Result<Option<ChainStatus>, ApiError> {
        let body = self.get_json("/faction/chain", &[], "faction_chain").await?;
        Ok(decode::decode_chain_status(&body))
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        op: &str,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            match self.attempt_get_json(&url, query).await {
                Ok(body) => return Ok(body),
                Err(FetchFailure::Retry { error, retry_after }) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(
                            op = op,
                            attempts = attempt,
                            error = %error,
                            "api request exhausted retries"
                        );
                        return Err(error);
                    }
                    let delay = compute_retry_delay(
                        self.retry_base_ms,
                        self.retry_max_ms,
                        self.retry_jitter_ms,
                        attempt,
                        op,
                        retry_after,
                    );
                    debug!(
                        op = op,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying api request"
                    );
                    time::sleep(delay).await;
                }
                Err(FetchFailure::Fatal(error)) => {
                    warn!(op = op, error = %error, "api request failed");
                    return Err(error);
                }
            }
        }
    }

    async fn attempt_get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchFailure> {
        let request = self
            .http
            .get(url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .query(query);
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                let code = if error.is_timeout() {
                    "timeout"
                } else if error.is_connect() {
                    "connect"
                } else {
                    "network"
                };
                return Err(FetchFailure::Retry {
                    error: ApiError::transient(code, error.to_string()),
                    retry_after: None,
                });
            }
        };
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let retry_after = parse_retry_after(&response);
            return Err(FetchFailure::Retry {
                error: ApiError::transient("http_status", format!("status {status}")),
                retry_after,
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchFailure::Fatal(ApiError::unauthorized(
                "http_status",
                format!("status {status}"),
            )));
        }
        if !status.is_success() {
            return Err(FetchFailure::Fatal(ApiError::malformed(
                "http_status",
                format!("status {status}"),
            )));
        }
        let body: Value = response.json().await.map_err(|error| {
            FetchFailure::Fatal(ApiError::malformed("invalid_json", error.to_string()))
        })?;
        // The API reports its own failures inside 200 bodies.
        if let Some(error) = decode::classify_error_envelope(&body) {
            if error.is_transient() {
                return Err(FetchFailure::Retry {
                    error,
                    retry_after: None,
                });
            }
            return Err(FetchFailure::Fatal(error));
        }
        Ok(body)
    }
}
