use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use warbot_core_types::{Aggregate, ScanMode, Subject};

use crate::error::StatsError;

type CacheKey = (ScanMode, Option<i64>);
type FlightResult = Result<Aggregate, StatsError>;

struct CachedAggregate {
    aggregate: Aggregate,
    war_start: i64,
    stored_at: Instant,
}

enum Slot {
    Ready(CachedAggregate),
    InFlight(broadcast::Sender<FlightResult>),
}

/// TTL cache with single-flight de-duplication. At most one scan per key
/// runs at a time; everyone else either gets the cached value or awaits the
/// in-flight leader's broadcast.
pub(crate) struct AggregateCache {
    member_ttl: Duration,
    faction_ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

pub(crate) enum CacheOutcome<'a> {
    Hit(Aggregate),
    Wait(broadcast::Receiver<FlightResult>),
    Lead(FlightLease<'a>),
}

/// Held by the one caller elected to scan for a key. Completing it publishes
/// the result; dropping it without completing clears the slot so the key is
/// not wedged by a cancelled leader.
pub(crate) struct FlightLease<'a> {
    cache: &'a AggregateCache,
    key: CacheKey,
    tx: broadcast::Sender<FlightResult>,
    completed: bool,
}

impl AggregateCache {
    pub(crate) fn new(member_ttl: Duration, faction_ttl: Duration) -> Self {
        Self {
            member_ttl,
            faction_ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn begin(
        &self,
        mode: ScanMode,
        subject: Subject,
        war_start: i64,
    ) -> CacheOutcome<'_> {
        let key = (mode, subject.member_id());
        let ttl = self.ttl_for(subject);
        let mut slots = self.lock_slots();
        match slots.get(&key) {
            Some(Slot::Ready(entry))
                if entry.war_start == war_start && entry.stored_at.elapsed() < ttl =>
            {
                return CacheOutcome::Hit(entry.aggregate.clone());
            }
            Some(Slot::InFlight(tx)) => {
                return CacheOutcome::Wait(tx.subscribe());
            }
            _ => {}
        }
        let (tx, _rx) = broadcast::channel(4);
        slots.insert(key, Slot::InFlight(tx.clone()));
        CacheOutcome::Lead(FlightLease {
            cache: self,
            key,
            tx,
            completed: false,
        })
    }

    fn ttl_for(&self, subject: Subject) -> Duration {
        match subject {
            Subject::Member(_) => self.member_ttl,
            Subject::Faction => self.faction_ttl,
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FlightLease<'_> {
    /// Publishes the scan result to the slot and to every waiter. Failures
    /// are never cached; the slot is cleared so the next caller rescans.
    pub(crate) fn complete(mut self, war_start: i64, result: &FlightResult) {
        {
            let mut slots = self.cache.lock_slots();
            match result {
                Ok(aggregate) => {
                    slots.insert(
                        self.key,
                        Slot::Ready(CachedAggregate {
                            aggregate: aggregate.clone(),
                            war_start,
                            stored_at: Instant::now(),
                        }),
                    );
                }
                Err(_) => {
                    slots.remove(&self.key);
                }
            }
        }
        let _ = self.tx.send(result.clone());
        self.completed = true;
    }
}

impl Drop for FlightLease<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let mut slots = self.cache.lock_slots();
            slots.remove(&self.key);
        }
    }
}
