use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use warbot_api_client::ActivitySource;
use warbot_core_types::{
    ActivityRecord, Aggregate, MemberTotals, ScanCheckpoint, ScanMode, ScanTotals, Subject,
    WarWindow,
};

use crate::error::StatsError;

#[derive(Debug)]
pub(crate) struct ScanOutcome {
    pub(crate) aggregate: Aggregate,
    /// Advanced boundary to persist. `None` for faction scans and for
    /// partial scans, which must not move the boundary past unseen pages.
    pub(crate) checkpoint: Option<ScanCheckpoint>,
}

fn is_newer_than(record: &ActivityRecord, ts: i64, seq: i64) -> bool {
    record.ts > ts || (record.ts == ts && record.id > seq)
}

/// Walks the outgoing-attacks feed newest to oldest, folding records into
/// running totals until it reaches the boundary (checkpoint or war start),
/// runs out of pages, or hits the page ceiling.
pub(crate) async fn run_scan(
    source: &ActivitySource,
    subject: Subject,
    mode: ScanMode,
    war_start: i64,
    now: i64,
    max_pages: u32,
    resume: Option<ScanCheckpoint>,
) -> Result<ScanOutcome, StatsError> {
    let resume = resume.filter(|checkpoint| checkpoint.war_start == war_start);
    let (mut totals, boundary_ts, boundary_seq) = match &resume {
        Some(checkpoint) => (checkpoint.totals, checkpoint.last_ts, checkpoint.last_seq),
        None => (ScanTotals::default(), war_start, 0),
    };
    let mut frontier_ts = boundary_ts;
    let mut frontier_seq = boundary_seq;
    let mut members: BTreeMap<i64, MemberTotals> = BTreeMap::new();
    let mut skipped: u64 = 0;
    let mut scanned_pages: u32 = 0;
    let mut partial = false;
    let mut reached_boundary = false;
    let mut cursor: Option<i64> = None;

    loop {
        if scanned_pages >= max_pages {
            partial = true;
            break;
        }
        let page = source.fetch_attack_page(cursor).await?;
        scanned_pages += 1;
        skipped += page.skipped;
        for record in &page.records {
            if !is_newer_than(record, boundary_ts, boundary_seq) {
                reached_boundary = true;
                continue;
            }
            if (record.ts, record.id) > (frontier_ts, frontier_seq) {
                frontier_ts = record.ts;
                frontier_seq = record.id;
            }
            if mode == ScanMode::RankedOnly && !record.ranked {
                continue;
            }
            match subject {
                Subject::Member(member_id) => {
                    if record.attacker_id != Some(member_id) {
                        continue;
                    }
                    totals.record(record);
                }
                Subject::Faction => {
                    let Some(attacker_id) = record.attacker_id else {
                        skipped += 1;
                        continue;
                    };
                    totals.record(record);
                    let entry = members.entry(attacker_id).or_insert_with(|| MemberTotals {
                        member_id: attacker_id,
                        name: String::new(),
                        totals: ScanTotals::default(),
                    });
                    if entry.name.is_empty() {
                        if let Some(name) = &record.attacker_name {
                            entry.name = name.clone();
                        }
                    }
                    entry.totals.record(record);
                }
            }
        }
        if reached_boundary {
            break;
        }
        match page.next_older_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(
        subject = ?subject,
        mode = mode.as_str(),
        pages = scanned_pages,
        total = totals.total,
        skipped = skipped,
        partial = partial,
        "scan finished"
    );

    let mut members: Vec<MemberTotals> = members.into_values().collect();
    members.sort_by(|a, b| {
        b.totals
            .total
            .cmp(&a.totals.total)
            .then(a.member_id.cmp(&b.member_id))
    });

    let checkpoint = match subject {
        Subject::Member(_) if !partial => Some(ScanCheckpoint {
            war_start,
            last_ts: frontier_ts,
            last_seq: frontier_seq,
            totals,
            updated_at: Utc::now(),
        }),
        _ => None,
    };

    Ok(ScanOutcome {
        aggregate: Aggregate {
            mode,
            subject,
            window: WarWindow {
                start: war_start,
                end: now,
            },
            totals,
            members,
            partial,
            scanned_pages,
            skipped_records: skipped,
        },
        checkpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warbot_api_client::{ApiError, AttackPage, MockActivitySource};

    fn record(id: i64, ts: i64, attacker: Option<i64>, ranked: bool) -> ActivityRecord {
        ActivityRecord {
            id,
            ts,
            attacker_id: attacker,
            attacker_name: attacker.map(|id| format!("m{id}")),
            defender_id: Some(5_000),
            ranked,
            fair_fight: None,
            respect: None,
            result: None,
        }
    }

    fn page(records: Vec<ActivityRecord>, next: Option<i64>) -> Result<AttackPage, ApiError> {
        Ok(AttackPage {
            records,
            skipped: 0,
            next_older_cursor: next,
        })
    }

    fn source_with(pages: Vec<Result<AttackPage, ApiError>>) -> ActivitySource {
        let mock = MockActivitySource::scripted();
        mock.set_pages(pages);
        ActivitySource::Mock(mock)
    }

    #[tokio::test]
    async fn worked_example_counts_two_and_averages_present_values() {
        let war_start = 1_700_000_000;
        let mut newest = record(3, 1_700_000_200, Some(7), true);
        newest.fair_fight = None;
        let mut middle = record(2, 1_700_000_100, Some(7), true);
        middle.fair_fight = Some(0.8);
        let before_war = record(1, 1_699_999_999, Some(7), true);
        let source = source_with(vec![page(vec![newest, middle, before_war], None)]);

        let outcome = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            war_start,
            war_start + 600,
            60,
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.aggregate.totals.total, 2);
        assert_eq!(outcome.aggregate.totals.avg_fair_fight(), Some(0.8));
        assert!(!outcome.aggregate.partial);
        let checkpoint = outcome.checkpoint.unwrap();
        assert_eq!(checkpoint.last_ts, 1_700_000_200);
        assert_eq!(checkpoint.last_seq, 3);
    }

    #[tokio::test]
    async fn record_at_exactly_war_start_is_counted() {
        let war_start = 1_700_000_000;
        let source = source_with(vec![page(
            vec![record(10, war_start, Some(7), true)],
            None,
        )]);
        let outcome = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            war_start,
            war_start + 60,
            60,
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.aggregate.totals.total, 1);
    }

    #[tokio::test]
    async fn page_ceiling_marks_partial_and_withholds_checkpoint() {
        let war_start = 1_700_000_000;
        let source = source_with(vec![
            page(vec![record(30, war_start + 300, Some(7), true)], Some(1)),
            page(vec![record(20, war_start + 200, Some(7), true)], Some(2)),
            page(vec![record(10, war_start + 100, Some(7), true)], None),
        ]);
        let outcome = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            war_start,
            war_start + 600,
            2,
            None,
        )
        .await
        .unwrap();
        assert!(outcome.aggregate.partial);
        assert_eq!(outcome.aggregate.scanned_pages, 2);
        assert_eq!(outcome.aggregate.totals.total, 2);
        assert!(outcome.checkpoint.is_none());
    }

    #[tokio::test]
    async fn resume_counts_only_records_past_the_boundary_tiebreak_included() {
        let war_start = 1_700_000_000;
        let mut resume = ScanCheckpoint::seed(war_start);
        resume.last_ts = 1_700_000_100;
        resume.last_seq = 5;
        resume.totals.total = 3;
        resume.totals.in_war = 3;

        // Same-second records: id 6 is past the boundary, id 5 is the
        // boundary itself.
        let source = source_with(vec![
            page(
                vec![
                    record(7, 1_700_000_150, Some(7), true),
                    record(6, 1_700_000_100, Some(7), true),
                    record(5, 1_700_000_100, Some(7), true),
                    record(4, 1_700_000_090, Some(7), true),
                ],
                Some(1),
            ),
            page(vec![record(3, 1_700_000_080, Some(7), true)], None),
        ]);
        let outcome = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            war_start,
            war_start + 600,
            60,
            Some(resume),
        )
        .await
        .unwrap();

        assert_eq!(outcome.aggregate.totals.total, 5, "3 resumed + 2 new");
        assert_eq!(outcome.aggregate.scanned_pages, 1, "stops at the boundary page");
        let checkpoint = outcome.checkpoint.unwrap();
        assert_eq!(checkpoint.last_ts, 1_700_000_150);
        assert_eq!(checkpoint.last_seq, 7);
    }

    #[tokio::test]
    async fn checkpoint_from_an_older_war_is_discarded() {
        let old_war = 1_600_000_000;
        let war_start = 1_700_000_000;
        let mut resume = ScanCheckpoint::seed(old_war);
        resume.totals.total = 40;

        let source = source_with(vec![page(
            vec![record(2, war_start + 100, Some(7), true)],
            None,
        )]);
        let outcome = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            war_start,
            war_start + 600,
            60,
            Some(resume),
        )
        .await
        .unwrap();
        assert_eq!(outcome.aggregate.totals.total, 1, "stale totals must not leak");
        assert_eq!(outcome.checkpoint.unwrap().war_start, war_start);
    }

    #[tokio::test]
    async fn faction_scan_attributes_per_member_and_skips_unattributed() {
        let war_start = 1_700_000_000;
        let source = source_with(vec![page(
            vec![
                record(9, war_start + 400, Some(7), true),
                record(8, war_start + 300, Some(7), true),
                record(7, war_start + 200, Some(8), true),
                record(6, war_start + 100, None, true),
            ],
            None,
        )]);
        let outcome = run_scan(
            &source,
            Subject::Faction,
            ScanMode::RankedOnly,
            war_start,
            war_start + 600,
            120,
            None,
        )
        .await
        .unwrap();

        let aggregate = outcome.aggregate;
        assert_eq!(aggregate.totals.total, 3);
        assert_eq!(aggregate.skipped_records, 1);
        assert_eq!(aggregate.members.len(), 2);
        assert_eq!(aggregate.members[0].member_id, 7);
        assert_eq!(aggregate.members[0].totals.total, 2);
        assert_eq!(aggregate.members[0].name, "m7");
        assert_eq!(aggregate.members[1].member_id, 8);
        assert!(outcome.checkpoint.is_none(), "faction scans never checkpoint");
    }

    #[tokio::test]
    async fn window_mode_splits_by_ranked_flag() {
        let war_start = 1_700_000_000;
        let pages = vec![page(
            vec![
                record(3, war_start + 300, Some(7), true),
                record(2, war_start + 200, Some(7), false),
                record(1, war_start + 100, Some(7), true),
            ],
            None,
        )];
        let source = source_with(pages);

        let window = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::AllActivity,
            war_start,
            war_start + 600,
            60,
            None,
        )
        .await
        .unwrap();
        assert_eq!(window.aggregate.totals.total, 3);
        assert_eq!(window.aggregate.totals.in_war, 2);
        assert_eq!(window.aggregate.totals.out_war, 1);

        // The mock serves the same pages again for a second walk.
        let ranked = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            war_start,
            war_start + 600,
            60,
            None,
        )
        .await
        .unwrap();
        assert_eq!(ranked.aggregate.totals.total, 2);
        assert_eq!(ranked.aggregate.totals.out_war, 0);
    }

    #[tokio::test]
    async fn page_fetch_error_surfaces_as_unavailable() {
        let source = source_with(vec![Err(ApiError::transient("timeout", "gave up"))]);
        let error = run_scan(
            &source,
            Subject::Member(7),
            ScanMode::RankedOnly,
            1_700_000_000,
            1_700_000_600,
            60,
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, crate::error::StatsErrorKind::Unavailable);
    }
}
