use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub system: SystemConfig,
    pub sqlite: SqliteConfig,
    pub api: ApiConfig,
    pub scan: ScanConfig,
    pub cache: CacheConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub env: String,
    pub log_level: String,
    pub log_json: bool,
    pub heartbeat_seconds: u64,
    pub migrations_dir: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            heartbeat_seconds: 30,
            migrations_dir: "migrations".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "state/warbot.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub source: String,
    pub base_url: String,
    pub api_key: String,
    pub user_agent: String,
    pub request_timeout_ms: u64,
    pub page_size: u32,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter_ms: u64,
    pub rps_limit: u64,
    pub rps_burst: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            source: "mock".to_string(),
            base_url: "https://api.torn.com/v2".to_string(),
            api_key: String::new(),
            user_agent: "warbot (faction tooling)".to_string(),
            request_timeout_ms: 25_000,
            page_size: 100,
            max_attempts: 3,
            retry_base_ms: 250,
            retry_max_ms: 2_000,
            retry_jitter_ms: 150,
            rps_limit: 0,
            rps_burst: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub faction_id: i64,
    pub member_max_pages: u32,
    pub faction_max_pages: u32,
    pub top_limit: u32,
    pub snapshot_report_seconds: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            faction_id: 0,
            member_max_pages: 60,
            faction_max_pages: 120,
            top_limit: 10,
            snapshot_report_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub member_ttl_seconds: u64,
    pub faction_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            member_ttl_seconds: 60,
            faction_ttl_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub autostart: bool,
    pub context_id: i64,
    pub channel_id: i64,
    pub poll_seconds: u64,
    pub alert_seconds: i64,
    pub ping_role: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            context_id: 0,
            channel_id: 0,
            poll_seconds: 15,
            alert_seconds: 75,
            ping_role: "Savior".to_string(),
        }
    }
}
