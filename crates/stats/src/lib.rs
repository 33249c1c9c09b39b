use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use warbot_api_client::ActivitySource;
use warbot_config::{CacheConfig, ScanConfig};
use warbot_core_types::{Aggregate, ScanMode, Subject};

mod aggregate;
mod cache;
mod error;
mod scan;
mod store;

pub use aggregate::{top_members, LeaderboardMetric};
pub use error::{StatsError, StatsErrorKind};
pub use store::CheckpointStore;

use cache::{AggregateCache, CacheOutcome};

/// On-demand war statistics. One instance serves every caller; per-key
/// serialization happens inside the cache, not here.
pub struct StatsService {
    source: Arc<ActivitySource>,
    checkpoints: Arc<dyn CheckpointStore>,
    member_max_pages: u32,
    faction_max_pages: u32,
    cache: AggregateCache,
}

impl StatsService {
    pub fn new(
        source: Arc<ActivitySource>,
        checkpoints: Arc<dyn CheckpointStore>,
        scan: &ScanConfig,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            source,
            checkpoints,
            member_max_pages: scan.member_max_pages,
            faction_max_pages: scan.faction_max_pages,
            cache: AggregateCache::new(
                Duration::from_secs(cache.member_ttl_seconds),
                Duration::from_secs(cache.faction_ttl_seconds),
            ),
        }
    }

    /// Aggregated war activity for one member or the whole faction. The war
    /// start is fetched fresh on every call; everything behind that gate
    /// goes through the single-flight cache.
    pub async fn get_stats(
        &self,
        subject: Subject,
        mode: ScanMode,
    ) -> Result<Aggregate, StatsError> {
        let war_start = self
            .source
            .fetch_war_start()
            .await?
            .ok_or_else(StatsError::no_active_war)?;
        match self.cache.begin(mode, subject, war_start) {
            CacheOutcome::Hit(aggregate) => Ok(aggregate),
            CacheOutcome::Wait(mut rx) => match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(StatsError::unavailable("aggregation interrupted")),
            },
            CacheOutcome::Lead(lease) => {
                let result = self.compute(subject, mode, war_start).await;
                lease.complete(war_start, &result);
                result
            }
        }
    }

    async fn compute(
        &self,
        subject: Subject,
        mode: ScanMode,
        war_start: i64,
    ) -> Result<Aggregate, StatsError> {
        let resume = match subject {
            Subject::Member(member_id) => match self.checkpoints.load(mode, member_id) {
                Ok(checkpoint) => checkpoint,
                Err(error) => {
                    warn!(
                        member_id = member_id,
                        error = %error,
                        "checkpoint load failed, scanning from the war start"
                    );
                    None
                }
            },
            Subject::Faction => None,
        };
        let max_pages = match subject {
            Subject::Member(_) => self.member_max_pages,
            Subject::Faction => self.faction_max_pages,
        };
        let now = Utc::now().timestamp();
        let outcome =
            scan::run_scan(&self.source, subject, mode, war_start, now, max_pages, resume).await?;
        if let (Subject::Member(member_id), Some(checkpoint)) = (subject, &outcome.checkpoint) {
            if let Err(error) = self.checkpoints.save(mode, member_id, checkpoint) {
                warn!(member_id = member_id, error = %error, "checkpoint save failed");
            }
        }
        info!(
            subject = ?subject,
            mode = mode.as_str(),
            total = outcome.aggregate.totals.total,
            pages = outcome.aggregate.scanned_pages,
            partial = outcome.aggregate.partial,
            "aggregate computed"
        );
        Ok(outcome.aggregate)
    }
}
