use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use warbot_api_client::ActivitySource;
use warbot_config::{load_from_env_or_default, AppConfig};
use warbot_core_types::{ScanMode, Subject};
use warbot_stats::{top_members, LeaderboardMetric, StatsErrorKind, StatsService};
use warbot_storage::{write_contention, SharedStore, SqliteStore};
use warbot_watcher::{
    AlertDispatcher, LoggingAlertSink, OptInStore, StaticRosterProvider, WatcherRegistry,
    WatcherSettings,
};

const DEFAULT_CONFIG_PATH: &str = "configs/dev.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = parse_config_arg();
    let default_path = cli_config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let (config, loaded_config_path) = load_from_env_or_default(&default_path)?;

    init_tracing(&config.system.log_level, config.system.log_json);
    info!(
        config_path = %loaded_config_path.display(),
        env = %config.system.env,
        api_source = %config.api.source,
        faction_id = config.scan.faction_id,
        "configuration loaded"
    );

    let mut sqlite = SqliteStore::open(Path::new(&config.sqlite.path))
        .context("failed to initialize sqlite store")?;
    let migrations_dir = PathBuf::from(&config.system.migrations_dir);
    let applied = sqlite
        .run_migrations(&migrations_dir)
        .with_context(|| format!("failed to apply migrations in {}", migrations_dir.display()))?;
    info!(applied, "sqlite migrations applied");

    let store = SharedStore::new(sqlite);
    store
        .record_heartbeat("warbot-app", "startup")
        .context("failed to write startup heartbeat")?;

    let source = Arc::new(
        ActivitySource::from_config(&config.api).context("failed to initialize activity source")?,
    );
    let stats = StatsService::new(
        Arc::clone(&source),
        Arc::new(store.clone()),
        &config.scan,
        &config.cache,
    );

    let optins: Arc<dyn OptInStore> = Arc::new(store.clone());
    let roster = Arc::new(StaticRosterProvider::default());
    let sink = Arc::new(LoggingAlertSink);
    let dispatcher = Arc::new(AlertDispatcher::new(roster, sink, Arc::clone(&optins)));
    let watchers = WatcherRegistry::new(Arc::clone(&source), optins, dispatcher);

    if config.watcher.autostart {
        let settings = WatcherSettings::from_config(&config.watcher);
        if watchers.start(settings, None) {
            info!(
                context_id = config.watcher.context_id,
                channel_id = config.watcher.channel_id,
                "chain watcher autostarted"
            );
        }
    }

    run_app_loop(store, stats, watchers, &config).await
}

fn parse_config_arg() -> Option<PathBuf> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(inline) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(inline));
        }
    }
    None
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    if json {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .json()
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

async fn run_app_loop(
    store: SharedStore,
    stats: StatsService,
    watchers: WatcherRegistry,
    config: &AppConfig,
) -> Result<()> {
    let mut heartbeat_interval =
        time::interval(Duration::from_secs(config.system.heartbeat_seconds.max(1)));
    let mut snapshot_interval = time::interval(Duration::from_secs(
        config.scan.snapshot_report_seconds.max(10),
    ));
    heartbeat_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    snapshot_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let top_limit = config.scan.top_limit as usize;

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if let Err(error) = store.record_heartbeat("warbot-app", "alive") {
                    warn!(error = %error, "heartbeat write failed");
                }
                let contention = write_contention();
                if contention.retries > 0 || contention.busy_errors > 0 {
                    debug!(
                        write_retries = contention.retries,
                        busy_errors = contention.busy_errors,
                        "sqlite contention counters"
                    );
                }
            }
            _ = snapshot_interval.tick() => {
                report_faction_snapshot(&stats, top_limit).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    watchers.stop_all().await;
    store
        .record_heartbeat("warbot-app", "shutdown")
        .context("failed to write shutdown heartbeat")?;
    Ok(())
}

/// Periodic operator-facing summary of the current ranked war. A quiet
/// skip when no war is underway, a warning otherwise.
async fn report_faction_snapshot(stats: &StatsService, top_limit: usize) {
    match stats.get_stats(Subject::Faction, ScanMode::RankedOnly).await {
        Ok(aggregate) => {
            info!(
                war_start = aggregate.window.start,
                attacks = aggregate.totals.total,
                respect = aggregate.totals.respect_sum,
                members = aggregate.members.len(),
                partial = aggregate.partial,
                scanned_pages = aggregate.scanned_pages,
                skipped_records = aggregate.skipped_records,
                "faction war snapshot"
            );
            for entry in top_members(&aggregate, LeaderboardMetric::Attacks, top_limit) {
                info!(
                    member_id = entry.member_id,
                    name = %entry.name,
                    attacks = entry.totals.total,
                    respect = entry.totals.respect_sum,
                    avg_fair_fight = entry.totals.avg_fair_fight().unwrap_or(0.0),
                    "war leaderboard entry"
                );
            }
        }
        Err(error) if error.kind == StatsErrorKind::NoActiveWar => {
            debug!("no ranked war underway, snapshot skipped");
        }
        Err(error) => {
            warn!(error = %error, "faction snapshot failed");
        }
    }
}
