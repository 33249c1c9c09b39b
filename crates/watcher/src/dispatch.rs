use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use warbot_core_types::{ChainAlert, ChainStatus};

use crate::optins::OptInStore;
use crate::WatcherSettings;

/// One roster row as the chat backend sees it. Only members already
/// filtered to the ping role are handed over.
#[derive(Debug, Clone)]
pub struct RosterMember {
    pub user_id: i64,
    pub online: bool,
    pub bot: bool,
}

/// Role and presence lookup lives in the chat backend, outside this crate.
pub trait RosterProvider: Send + Sync {
    fn role_members(&self, context_id: i64, role: &str) -> Result<Vec<RosterMember>>;
}

/// Delivery seam. Message formatting and the chat transport live behind it.
pub trait AlertSink: Send + Sync {
    fn send(&self, alert: &ChainAlert) -> Result<()>;
}

/// Fixed roster, for dev runs and tests.
#[derive(Debug, Default)]
pub struct StaticRosterProvider {
    members: Vec<RosterMember>,
}

impl StaticRosterProvider {
    pub fn new(members: Vec<RosterMember>) -> Self {
        Self { members }
    }
}

impl RosterProvider for StaticRosterProvider {
    fn role_members(&self, _context_id: i64, _role: &str) -> Result<Vec<RosterMember>> {
        Ok(self.members.clone())
    }
}

/// Sink that only logs, so the whole loop runs without a chat backend.
#[derive(Debug, Default)]
pub struct LoggingAlertSink;

impl AlertSink for LoggingAlertSink {
    fn send(&self, alert: &ChainAlert) -> Result<()> {
        info!(
            context_id = alert.context_id,
            channel_id = alert.channel_id,
            chain_id = alert.chain_id,
            seconds_remaining = alert.seconds_remaining,
            recipients = ?alert.recipients,
            correlation_id = %alert.correlation_id,
            "chain alert"
        );
        Ok(())
    }
}

/// Builds and sends the one alert per fired window. It holds no
/// de-duplication state of its own; the watcher's armed flag is the guard.
pub struct AlertDispatcher {
    roster: Arc<dyn RosterProvider>,
    sink: Arc<dyn AlertSink>,
    optins: Arc<dyn OptInStore>,
}

impl AlertDispatcher {
    pub fn new(
        roster: Arc<dyn RosterProvider>,
        sink: Arc<dyn AlertSink>,
        optins: Arc<dyn OptInStore>,
    ) -> Self {
        Self {
            roster,
            sink,
            optins,
        }
    }

    pub fn dispatch(&self, settings: &WatcherSettings, status: &ChainStatus) -> Result<()> {
        let roster = self
            .roster
            .role_members(settings.context_id, &settings.ping_role)?;
        let optins = match self.optins.list_active(settings.context_id) {
            Ok(optins) => optins,
            Err(error) => {
                warn!(
                    context_id = settings.context_id,
                    error = %error,
                    "opt-in lookup failed, pinging online members only"
                );
                Vec::new()
            }
        };
        let alert = ChainAlert {
            context_id: settings.context_id,
            channel_id: settings.channel_id,
            chain_id: status.id,
            seconds_remaining: status.timeout,
            recipients: resolve_recipients(&roster, &optins),
            correlation_id: Uuid::new_v4(),
            ts_utc: Utc::now(),
        };
        info!(
            context_id = alert.context_id,
            chain_id = alert.chain_id,
            seconds_remaining = alert.seconds_remaining,
            recipients = alert.recipients.len(),
            correlation_id = %alert.correlation_id,
            "chain alert firing"
        );
        self.sink.send(&alert)
    }
}

/// Role holders who are online or opted in, bots removed, sorted so the
/// rendered ping list is stable.
fn resolve_recipients(roster: &[RosterMember], optins: &[i64]) -> Vec<i64> {
    let optins: HashSet<i64> = optins.iter().copied().collect();
    let mut recipients: Vec<i64> = roster
        .iter()
        .filter(|member| !member.bot)
        .filter(|member| member.online || optins.contains(&member.user_id))
        .map(|member| member.user_id)
        .collect();
    recipients.sort_unstable();
    recipients.dedup();
    recipients
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MemoryOptIns {
        rows: Mutex<Vec<(i64, i64)>>,
    }

    impl MemoryOptIns {
        fn with(rows: Vec<(i64, i64)>) -> Self {
            Self {
                rows: Mutex::new(rows),
            }
        }
    }

    impl OptInStore for MemoryOptIns {
        fn add(&self, context_id: i64, user_id: i64) -> Result<bool> {
            self.rows.lock().unwrap().push((context_id, user_id));
            Ok(true)
        }

        fn remove(&self, _context_id: i64, _user_id: i64) -> Result<bool> {
            Ok(false)
        }

        fn clear_all(&self, context_id: i64) -> Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|(context, _)| *context != context_id);
            Ok(before - rows.len())
        }

        fn list_active(&self, context_id: i64) -> Result<Vec<i64>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(context, _)| *context == context_id)
                .map(|(_, user)| *user)
                .collect())
        }
    }

    struct FailingOptIns;

    impl OptInStore for FailingOptIns {
        fn add(&self, _context_id: i64, _user_id: i64) -> Result<bool> {
            Err(anyhow!("opt-in table unavailable"))
        }

        fn remove(&self, _context_id: i64, _user_id: i64) -> Result<bool> {
            Err(anyhow!("opt-in table unavailable"))
        }

        fn clear_all(&self, _context_id: i64) -> Result<usize> {
            Err(anyhow!("opt-in table unavailable"))
        }

        fn list_active(&self, _context_id: i64) -> Result<Vec<i64>> {
            Err(anyhow!("opt-in table unavailable"))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<ChainAlert>>,
    }

    impl AlertSink for RecordingSink {
        fn send(&self, alert: &ChainAlert) -> Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn member(user_id: i64, online: bool, bot: bool) -> RosterMember {
        RosterMember {
            user_id,
            online,
            bot,
        }
    }

    fn settings() -> WatcherSettings {
        WatcherSettings {
            context_id: 42,
            channel_id: 9_000,
            poll_interval: Duration::from_secs(15),
            alert_threshold: 75,
            ping_role: "Savior".to_string(),
        }
    }

    fn status(id: i64, timeout: i64) -> ChainStatus {
        ChainStatus {
            id,
            timeout,
            current: None,
            max: None,
            cooldown: None,
            start: None,
            end: None,
            modifier: None,
        }
    }

    #[test]
    fn recipients_are_role_and_presence_or_optin_minus_bots_sorted() {
        let roster = Arc::new(StaticRosterProvider::new(vec![
            member(30, true, false),
            member(10, false, false),
            member(20, false, false),
            member(40, true, true),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let optins = Arc::new(MemoryOptIns::with(vec![(42, 10), (99, 20)]));
        let dispatcher = AlertDispatcher::new(roster, Arc::clone(&sink) as Arc<dyn AlertSink>, optins);

        dispatcher.dispatch(&settings(), &status(7, 45)).unwrap();

        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1, "exactly one batched send");
        let alert = &alerts[0];
        assert_eq!(alert.recipients, vec![10, 30]);
        assert_eq!(alert.chain_id, 7);
        assert_eq!(alert.seconds_remaining, 45);
        assert_eq!(alert.channel_id, 9_000);
    }

    #[test]
    fn optin_store_failure_degrades_to_online_members() {
        let roster = Arc::new(StaticRosterProvider::new(vec![
            member(10, false, false),
            member(30, true, false),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(
            roster,
            Arc::clone(&sink) as Arc<dyn AlertSink>,
            Arc::new(FailingOptIns),
        );

        dispatcher.dispatch(&settings(), &status(7, 45)).unwrap();
        assert_eq!(sink.alerts.lock().unwrap()[0].recipients, vec![30]);
    }

    #[test]
    fn duplicate_roster_rows_collapse() {
        let roster = Arc::new(StaticRosterProvider::new(vec![
            member(10, true, false),
            member(10, true, false),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(
            roster,
            Arc::clone(&sink) as Arc<dyn AlertSink>,
            Arc::new(MemoryOptIns::with(Vec::new())),
        );
        dispatcher.dispatch(&settings(), &status(7, 45)).unwrap();
        assert_eq!(sink.alerts.lock().unwrap()[0].recipients, vec![10]);
    }
}
