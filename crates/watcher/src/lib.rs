use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use warbot_api_client::ActivitySource;
use warbot_config::WatcherConfig;

mod chain;
mod dispatch;
mod optins;

pub use dispatch::{
    AlertDispatcher, AlertSink, LoggingAlertSink, RosterMember, RosterProvider,
    StaticRosterProvider,
};
pub use optins::OptInStore;

use chain::ChainMachine;

/// Immutable per-watcher configuration, fixed at spawn.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub context_id: i64,
    pub channel_id: i64,
    pub poll_interval: Duration,
    pub alert_threshold: i64,
    pub ping_role: String,
}

impl WatcherSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            context_id: config.context_id,
            channel_id: config.channel_id,
            poll_interval: Duration::from_secs(config.poll_seconds.max(1)),
            alert_threshold: config.alert_seconds,
            ping_role: config.ping_role.clone(),
        }
    }
}

/// Read-only view of one running watcher, refreshed after each successful
/// poll. Served from memory; reading it never touches the network.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub chain_id: Option<i64>,
    pub seconds_remaining: Option<i64>,
    pub armed: bool,
    pub last_poll: Option<DateTime<Utc>>,
    pub channel_id: i64,
    pub started_by: Option<i64>,
}

struct WatcherHandle {
    stop_tx: mpsc::Sender<()>,
    snapshot: Arc<Mutex<ChainState>>,
}

/// One watcher task per monitored context. Start and stop are idempotent
/// per context; stop delivers at the next poll boundary.
pub struct WatcherRegistry {
    source: Arc<ActivitySource>,
    optins: Arc<dyn OptInStore>,
    dispatcher: Arc<AlertDispatcher>,
    watchers: Mutex<HashMap<i64, WatcherHandle>>,
}

impl WatcherRegistry {
    pub fn new(
        source: Arc<ActivitySource>,
        optins: Arc<dyn OptInStore>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            source,
            optins,
            dispatcher,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns a watcher for the context. Returns false when one is already
    /// running there.
    pub fn start(&self, settings: WatcherSettings, started_by: Option<i64>) -> bool {
        let mut watchers = self.lock_watchers();
        if watchers.contains_key(&settings.context_id) {
            return false;
        }
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let snapshot = Arc::new(Mutex::new(ChainState {
            chain_id: None,
            seconds_remaining: None,
            armed: true,
            last_poll: None,
            channel_id: settings.channel_id,
            started_by,
        }));
        info!(
            context_id = settings.context_id,
            channel_id = settings.channel_id,
            poll_ms = settings.poll_interval.as_millis() as u64,
            alert_threshold = settings.alert_threshold,
            "watcher starting"
        );
        let context_id = settings.context_id;
        tokio::spawn(watch_loop(
            settings,
            Arc::clone(&self.source),
            Arc::clone(&self.dispatcher),
            Arc::clone(&snapshot),
            stop_rx,
        ));
        watchers.insert(context_id, WatcherHandle { stop_tx, snapshot });
        true
    }

    /// Stops the context's watcher and clears its session opt-ins. Returns
    /// false when nothing was running there.
    pub async fn stop(&self, context_id: i64) -> bool {
        let handle = self.lock_watchers().remove(&context_id);
        let Some(handle) = handle else {
            return false;
        };
        let _ = handle.stop_tx.send(()).await;
        match self.optins.clear_all(context_id) {
            Ok(cleared) => {
                info!(context_id = context_id, cleared = cleared, "watcher stopped")
            }
            Err(error) => warn!(
                context_id = context_id,
                error = %error,
                "watcher stopped, opt-in clear failed"
            ),
        }
        true
    }

    pub async fn stop_all(&self) {
        let context_ids: Vec<i64> = self.lock_watchers().keys().copied().collect();
        for context_id in context_ids {
            self.stop(context_id).await;
        }
    }

    /// Snapshot for the context, or `None` when it is idle.
    pub fn chain_status(&self, context_id: i64) -> Option<ChainState> {
        let watchers = self.lock_watchers();
        let handle = watchers.get(&context_id)?;
        let snapshot = handle
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(snapshot.clone())
    }

    fn lock_watchers(&self) -> MutexGuard<'_, HashMap<i64, WatcherHandle>> {
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn watch_loop(
    settings: WatcherSettings,
    source: Arc<ActivitySource>,
    dispatcher: Arc<AlertDispatcher>,
    snapshot: Arc<Mutex<ChainState>>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut interval = time::interval(settings.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut machine = ChainMachine::new();
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                debug!(context_id = settings.context_id, "watcher loop exiting");
                break;
            }
            _ = interval.tick() => {
                match source.fetch_chain_status().await {
                    Ok(Some(status)) => {
                        let fire = machine.observe(&status, settings.alert_threshold);
                        {
                            let mut state = snapshot
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner());
                            state.chain_id = Some(status.id);
                            state.seconds_remaining = Some(status.timeout);
                            state.armed = machine.armed();
                            state.last_poll = Some(Utc::now());
                        }
                        if fire {
                            if let Err(error) = dispatcher.dispatch(&settings, &status) {
                                warn!(
                                    context_id = settings.context_id,
                                    error = %error,
                                    "alert dispatch failed"
                                );
                            }
                        }
                    }
                    Ok(None) => {
                        // No chain right now. Skip the observation, keep
                        // the machine as it is.
                        let mut state = snapshot
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        state.last_poll = Some(Utc::now());
                        debug!(context_id = settings.context_id, "no active chain");
                    }
                    Err(error) => {
                        warn!(
                            context_id = settings.context_id,
                            error = %error,
                            "chain poll failed"
                        );
                    }
                }
            }
        }
    }
}
