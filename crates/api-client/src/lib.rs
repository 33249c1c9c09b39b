use anyhow::{anyhow, Result};

use warbot_config::ApiConfig;
use warbot_core_types::ChainStatus;

mod client;
mod decode;
mod error;
mod mock;
mod throttle;

pub use client::ApiClient;
pub use decode::AttackPage;
pub use error::{ApiError, ApiErrorKind};
pub use mock::MockActivitySource;

/// Where activity data comes from. The mock variant is always compiled in
/// so dev and tests never need network access or an API key.
#[derive(Debug)]
pub enum ActivitySource {
    Http(ApiClient),
    Mock(MockActivitySource),
}

impl ActivitySource {
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        match config.source.trim().to_lowercase().as_str() {
            "http" => Ok(Self::Http(ApiClient::new(config)?)),
            "mock" => Ok(Self::Mock(MockActivitySource::new())),
            other => Err(anyhow!("unknown api.source: {other}")),
        }
    }

    pub async fn fetch_attack_page(&self, cursor: Option<i64>) -> Result<AttackPage, ApiError> {
        match self {
            Self::Http(client) => client.fetch_attack_page(cursor).await,
            Self::Mock(mock) => mock.fetch_attack_page(cursor),
        }
    }

    pub async fn fetch_war_start(&self) -> Result<Option<i64>, ApiError> {
        match self {
            Self::Http(client) => client.fetch_war_start().await,
            Self::Mock(mock) => mock.fetch_war_start(),
        }
    }

    pub async fn fetch_chain_status(&self) -> Result<Option<ChainStatus>, ApiError> {
        match self {
            Self::Http(client) => client.fetch_chain_status().await,
            Self::Mock(mock) => mock.fetch_chain_status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_selection_rejects_unknown_names() {
        let mut config = ApiConfig::default();
        config.source = "carrier-pigeon".to_string();
        let error = ActivitySource::from_config(&config).unwrap_err();
        assert!(error.to_string().contains("unknown api.source"));
    }

    #[tokio::test]
    async fn mock_source_is_selected_case_insensitively() {
        let mut config = ApiConfig::default();
        config.source = " Mock ".to_string();
        let source = ActivitySource::from_config(&config).unwrap();
        assert!(source.fetch_war_start().await.unwrap().is_some());
    }
}
