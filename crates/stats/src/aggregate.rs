use warbot_core_types::{Aggregate, MemberTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardMetric {
    Attacks,
    Respect,
    AvgFairFight,
}

impl LeaderboardMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardMetric::Attacks => "attacks",
            LeaderboardMetric::Respect => "respect",
            LeaderboardMetric::AvgFairFight => "avg_fair_fight",
        }
    }
}

/// Top `limit` leaderboard rows for a metric, ties broken by member id so
/// repeated calls render identically. The fair-fight ranking drops members
/// with no sampled value rather than ranking them as zero.
pub fn top_members(
    aggregate: &Aggregate,
    metric: LeaderboardMetric,
    limit: usize,
) -> Vec<MemberTotals> {
    let mut rows: Vec<MemberTotals> = match metric {
        LeaderboardMetric::AvgFairFight => aggregate
            .members
            .iter()
            .filter(|member| member.totals.fair_fight_count > 0)
            .cloned()
            .collect(),
        _ => aggregate.members.clone(),
    };
    rows.sort_by(|a, b| {
        let ordering = match metric {
            LeaderboardMetric::Attacks => b.totals.total.cmp(&a.totals.total),
            LeaderboardMetric::Respect => b.totals.respect_sum.total_cmp(&a.totals.respect_sum),
            LeaderboardMetric::AvgFairFight => b
                .totals
                .avg_fair_fight()
                .unwrap_or(0.0)
                .total_cmp(&a.totals.avg_fair_fight().unwrap_or(0.0)),
        };
        ordering.then(a.member_id.cmp(&b.member_id))
    });
    rows.truncate(limit);
    rows
}
