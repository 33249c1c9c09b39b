use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::AppConfig;

pub fn load_from_path(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
    Ok(cfg)
}

pub fn load_from_env_or_default(default_path: &Path) -> Result<(AppConfig, PathBuf)> {
    let configured = env::var("WARBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_path.to_path_buf());
    let mut config = load_from_path(&configured)?;

    if let Ok(path) = env::var("WARBOT_SQLITE_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            config.sqlite.path = trimmed.to_string();
        }
    }
    if let Ok(source) = env::var("WARBOT_API_SOURCE") {
        let trimmed = source.trim();
        if !trimmed.is_empty() {
            config.api.source = trimmed.to_string();
        }
    }
    if let Ok(base_url) = env::var("WARBOT_API_BASE_URL") {
        config.api.base_url = base_url;
    }
    if let Ok(api_key) = env::var("WARBOT_API_KEY") {
        config.api.api_key = api_key;
    }
    if let Ok(user_agent) = env::var("WARBOT_API_USER_AGENT") {
        let trimmed = user_agent.trim();
        if !trimmed.is_empty() {
            config.api.user_agent = trimmed.to_string();
        }
    }
    if let Some(request_timeout_ms) = env::var("WARBOT_API_REQUEST_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.api.request_timeout_ms = request_timeout_ms;
    }
    if let Some(page_size) = env::var("WARBOT_API_PAGE_SIZE")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        config.api.page_size = page_size;
    }
    if let Some(max_attempts) = env::var("WARBOT_API_MAX_ATTEMPTS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        config.api.max_attempts = max_attempts;
    }
    if let Some(retry_base_ms) = env::var("WARBOT_API_RETRY_BASE_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.api.retry_base_ms = retry_base_ms;
    }
    if let Some(retry_max_ms) = env::var("WARBOT_API_RETRY_MAX_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.api.retry_max_ms = retry_max_ms;
    }
    if let Some(retry_jitter_ms) = env::var("WARBOT_API_RETRY_JITTER_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.api.retry_jitter_ms = retry_jitter_ms;
    }
    if let Some(rps_limit) = env::var("WARBOT_API_RPS_LIMIT")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.api.rps_limit = rps_limit;
    }
    if let Some(rps_burst) = env::var("WARBOT_API_RPS_BURST")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.api.rps_burst = rps_burst;
    }
    if let Some(faction_id) = env::var("WARBOT_SCAN_FACTION_ID")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
    {
        config.scan.faction_id = faction_id;
    }
    if let Some(member_max_pages) = env::var("WARBOT_SCAN_MEMBER_MAX_PAGES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        config.scan.member_max_pages = member_max_pages;
    }
    if let Some(faction_max_pages) = env::var("WARBOT_SCAN_FACTION_MAX_PAGES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        config.scan.faction_max_pages = faction_max_pages;
    }
    if let Some(top_limit) = env::var("WARBOT_SCAN_TOP_LIMIT")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        config.scan.top_limit = top_limit;
    }
    if let Some(snapshot_report_seconds) = env::var("WARBOT_SCAN_SNAPSHOT_REPORT_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.scan.snapshot_report_seconds = snapshot_report_seconds;
    }
    if let Some(member_ttl_seconds) = env::var("WARBOT_CACHE_MEMBER_TTL_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.cache.member_ttl_seconds = member_ttl_seconds;
    }
    if let Some(faction_ttl_seconds) = env::var("WARBOT_CACHE_FACTION_TTL_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.cache.faction_ttl_seconds = faction_ttl_seconds;
    }
    if let Some(autostart) = env::var("WARBOT_WATCHER_AUTOSTART")
        .ok()
        .and_then(parse_env_bool)
    {
        config.watcher.autostart = autostart;
    }
    if let Some(context_id) = env::var("WARBOT_WATCHER_CONTEXT_ID")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
    {
        config.watcher.context_id = context_id;
    }
    if let Some(channel_id) = env::var("WARBOT_WATCHER_CHANNEL_ID")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
    {
        config.watcher.channel_id = channel_id;
    }
    if let Some(poll_seconds) = env::var("WARBOT_WATCHER_POLL_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.watcher.poll_seconds = poll_seconds;
    }
    if let Some(alert_seconds) = env::var("WARBOT_WATCHER_ALERT_SECONDS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
    {
        config.watcher.alert_seconds = alert_seconds;
    }
    if let Ok(ping_role) = env::var("WARBOT_WATCHER_PING_ROLE") {
        let trimmed = ping_role.trim();
        if !trimmed.is_empty() {
            config.watcher.ping_role = trimmed.to_string();
        }
    }

    validate_config(&config)?;

    Ok((config, configured))
}

fn parse_env_bool(value: String) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_config(config: &AppConfig) -> Result<()> {
    let source = config.api.source.trim().to_ascii_lowercase();
    if source != "http" && source != "mock" {
        return Err(anyhow!(
            "api.source must be \"http\" or \"mock\", got: {}",
            config.api.source
        ));
    }
    if source == "http" {
        if config.api.base_url.trim().is_empty() {
            return Err(anyhow!(
                "api.base_url must be set when api.source=http (check WARBOT_API_BASE_URL)"
            ));
        }
        if config.api.api_key.trim().is_empty() {
            return Err(anyhow!(
                "api.api_key must be set when api.source=http (check WARBOT_API_KEY)"
            ));
        }
        if config.scan.faction_id <= 0 {
            return Err(anyhow!(
                "scan.faction_id must be a positive id when api.source=http (check WARBOT_SCAN_FACTION_ID)"
            ));
        }
    }
    if config.api.page_size == 0 {
        return Err(anyhow!("api.page_size must be greater than zero"));
    }
    if config.api.max_attempts == 0 {
        return Err(anyhow!("api.max_attempts must be greater than zero"));
    }
    if config.scan.member_max_pages == 0 {
        return Err(anyhow!("scan.member_max_pages must be greater than zero"));
    }
    if config.scan.faction_max_pages == 0 {
        return Err(anyhow!("scan.faction_max_pages must be greater than zero"));
    }
    if config.watcher.poll_seconds == 0 {
        return Err(anyhow!("watcher.poll_seconds must be greater than zero"));
    }
    if config.watcher.alert_seconds <= 0 {
        return Err(anyhow!("watcher.alert_seconds must be greater than zero"));
    }
    if config.watcher.autostart && config.watcher.context_id <= 0 {
        return Err(anyhow!(
            "watcher.context_id must be a positive id when watcher.autostart=true (check WARBOT_WATCHER_CONTEXT_ID)"
        ));
    }
    Ok(())
}
