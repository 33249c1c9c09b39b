use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    /// Unix seconds.
    pub ts: i64,
    pub attacker_id: Option<i64>,
    pub attacker_name: Option<String>,
    pub defender_id: Option<i64>,
    pub ranked: bool,
    pub fair_fight: Option<f64>,
    pub respect: Option<f64>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    RankedOnly,
    AllActivity,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::RankedOnly => "ranked",
            ScanMode::AllActivity => "window",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Member(i64),
    Faction,
}

impl Subject {
    pub fn member_id(&self) -> Option<i64> {
        match self {
            Subject::Member(id) => Some(*id),
            Subject::Faction => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WarWindow {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanTotals {
    pub total: u64,
    pub in_war: u64,
    pub out_war: u64,
    pub fair_fight_sum: f64,
    pub fair_fight_count: u64,
    pub respect_sum: f64,
}

impl ScanTotals {
    pub fn record(&mut self, record: &ActivityRecord) {
        self.total += 1;
        if record.ranked {
            self.in_war += 1;
        } else {
            self.out_war += 1;
        }
        if let Some(fair_fight) = record.fair_fight {
            self.fair_fight_sum += fair_fight;
            self.fair_fight_count += 1;
        }
        if let Some(respect) = record.respect {
            self.respect_sum += respect;
        }
    }

    pub fn merge(&mut self, other: &ScanTotals) {
        self.total += other.total;
        self.in_war += other.in_war;
        self.out_war += other.out_war;
        self.fair_fight_sum += other.fair_fight_sum;
        self.fair_fight_count += other.fair_fight_count;
        self.respect_sum += other.respect_sum;
    }

    pub fn avg_fair_fight(&self) -> Option<f64> {
        if self.fair_fight_count == 0 {
            return None;
        }
        Some(self.fair_fight_sum / self.fair_fight_count as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberTotals {
    pub member_id: i64,
    pub name: String,
    pub totals: ScanTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub mode: ScanMode,
    pub subject: Subject,
    pub window: WarWindow,
    pub totals: ScanTotals,
    pub members: Vec<MemberTotals>,
    pub partial: bool,
    pub scanned_pages: u32,
    pub skipped_records: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub war_start: i64,
    pub last_ts: i64,
    /// Record id at `last_ts`, breaking ties between records in the same second.
    pub last_seq: i64,
    pub totals: ScanTotals,
    pub updated_at: DateTime<Utc>,
}

impl ScanCheckpoint {
    pub fn seed(war_start: i64) -> Self {
        Self {
            war_start,
            last_ts: war_start,
            last_seq: 0,
            totals: ScanTotals::default(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStatus {
    pub id: i64,
    pub timeout: i64,
    pub current: Option<i64>,
    pub max: Option<i64>,
    pub cooldown: Option<i64>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub modifier: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAlert {
    pub context_id: i64,
    pub channel_id: i64,
    pub chain_id: i64,
    pub seconds_remaining: i64,
    pub recipients: Vec<i64>,
    pub correlation_id: Uuid,
    pub ts_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_record_splits_by_ranked_flag() {
        let mut totals = ScanTotals::default();
        totals.record(&ActivityRecord {
            id: 1,
            ts: 100,
            attacker_id: Some(7),
            attacker_name: Some("Raider".to_string()),
            defender_id: Some(8),
            ranked: true,
            fair_fight: Some(2.0),
            respect: Some(4.5),
            result: None,
        });
        totals.record(&ActivityRecord {
            id: 2,
            ts: 101,
            attacker_id: Some(7),
            attacker_name: Some("Raider".to_string()),
            defender_id: Some(9),
            ranked: false,
            fair_fight: None,
            respect: None,
            result: None,
        });
        assert_eq!(totals.total, 2);
        assert_eq!(totals.in_war, 1);
        assert_eq!(totals.out_war, 1);
        assert_eq!(totals.fair_fight_count, 1);
        assert_eq!(totals.avg_fair_fight(), Some(2.0));
        assert!((totals.respect_sum - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn avg_fair_fight_is_none_without_samples() {
        let totals = ScanTotals::default();
        assert_eq!(totals.avg_fair_fight(), None);
    }

    #[test]
    fn checkpoint_seed_starts_at_war_boundary() {
        let checkpoint = ScanCheckpoint::seed(1_700_000_000);
        assert_eq!(checkpoint.war_start, 1_700_000_000);
        assert_eq!(checkpoint.last_ts, 1_700_000_000);
        assert_eq!(checkpoint.last_seq, 0);
        assert_eq!(checkpoint.totals.total, 0);
    }
}
