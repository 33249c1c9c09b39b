use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;

use warbot_core_types::{ActivityRecord, ChainStatus};

use crate::decode::AttackPage;
use crate::error::ApiError;

#[derive(Debug)]
struct MockState {
    pages: Vec<Result<AttackPage, ApiError>>,
    war_start: Result<Option<i64>, ApiError>,
    chain_statuses: VecDeque<Result<Option<ChainStatus>, ApiError>>,
    last_chain: Option<Result<Option<ChainStatus>, ApiError>>,
    cycle_chain: bool,
    page_fetches: u64,
    war_start_fetches: u64,
    chain_fetches: u64,
}

/// Offline stand-in for the real API. `new` carries a small synthetic war
/// so the whole app runs against it in dev; `scripted` starts empty and
/// lets tests stage exact responses.
///
/// Pages are addressed by cursor: `None` is page zero and every page links
/// to its successor, so repeated scans see the same data.
#[derive(Debug)]
pub struct MockActivitySource {
    state: Mutex<MockState>,
}

impl MockActivitySource {
    pub fn new() -> Self {
        let now = Utc::now().timestamp();
        let war_start = now - 3_600;
        let members = [(101, "Anvil"), (102, "Bullet"), (103, "Cinder")];
        let mut pages = Vec::new();
        for page_index in 0..2i64 {
            let mut records = Vec::new();
            for slot in 0..5i64 {
                let n = page_index * 5 + slot;
                let (member_id, member_name) = members[(n % 3) as usize];
                // The deepest records predate the war so scans exercise
                // the cutoff.
                let ts = now - 600 * (n + 1);
                records.push(ActivityRecord {
                    id: 9_000 - n,
                    ts,
                    attacker_id: Some(member_id),
                    attacker_name: Some(member_name.to_string()),
                    defender_id: Some(8_000 + n),
                    ranked: ts >= war_start,
                    fair_fight: Some(1.0 + 0.25 * (n % 4) as f64),
                    respect: Some(3.0 + (n % 5) as f64),
                    result: Some("Hospitalized".to_string()),
                });
            }
            let next_older_cursor = if page_index == 0 { Some(1) } else { None };
            pages.push(Ok(AttackPage {
                records,
                skipped: 0,
                next_older_cursor,
            }));
        }

        let chain = |id: i64, timeout: i64| {
            Ok(Some(ChainStatus {
                id,
                timeout,
                current: Some(40),
                max: Some(100),
                cooldown: Some(0),
                start: Some(war_start),
                end: None,
                modifier: Some(1.0),
            }))
        };
        let chain_statuses = VecDeque::from(vec![
            Ok(None),
            chain(1, 180),
            chain(1, 60),
            chain(1, 240),
            chain(1, 45),
            Ok(None),
            chain(2, 200),
            chain(2, 50),
        ]);

        Self {
            state: Mutex::new(MockState {
                pages,
                war_start: Ok(Some(war_start)),
                chain_statuses,
                last_chain: None,
                cycle_chain: true,
                page_fetches: 0,
                war_start_fetches: 0,
                chain_fetches: 0,
            }),
        }
    }

    pub fn scripted() -> Self {
        Self {
            state: Mutex::new(MockState {
                pages: Vec::new(),
                war_start: Ok(None),
                chain_statuses: VecDeque::new(),
                last_chain: None,
                cycle_chain: false,
                page_fetches: 0,
                war_start_fetches: 0,
                chain_fetches: 0,
            }),
        }
    }

    pub fn set_pages(&self, pages: Vec<Result<AttackPage, ApiError>>) {
        self.lock().pages = pages;
    }

    pub fn set_war_start(&self, war_start: Result<Option<i64>, ApiError>) {
        self.lock().war_start = war_start;
    }

    pub fn push_chain_status(&self, status: Result<Option<ChainStatus>, ApiError>) {
        self.lock().chain_statuses.push_back(status);
    }

    pub fn page_fetch_count(&self) -> u64 {
        self.lock().page_fetches
    }

    pub fn war_start_fetch_count(&self) -> u64 {
        self.lock().war_start_fetches
    }

    pub fn chain_fetch_count(&self) -> u64 {
        self.lock().chain_fetches
    }

    pub fn fetch_attack_page(&self, cursor: Option<i64>) -> Result<AttackPage, ApiError> {
        let mut state = self.lock();
        state.page_fetches += 1;
        let index = cursor.unwrap_or(0).max(0) as usize;
        match state.pages.get(index) {
            Some(page) => page.clone(),
            None => Ok(AttackPage::default()),
        }
    }

    pub fn fetch_war_start(&self) -> Result<Option<i64>, ApiError> {
        let mut state = self.lock();
        state.war_start_fetches += 1;
        state.war_start.clone()
    }

    pub fn fetch_chain_status(&self) -> Result<Option<ChainStatus>, ApiError> {
        let mut state = self.lock();
        state.chain_fetches += 1;
        match state.chain_statuses.pop_front() {
            Some(status) => {
                if state.cycle_chain {
                    state.chain_statuses.push_back(status.clone());
                } else {
                    state.last_chain = Some(status.clone());
                }
                status
            }
            None => state.last_chain.clone().unwrap_or(Ok(None)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockActivitySource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_dataset_terminates_and_straddles_the_war_start() {
        let mock = MockActivitySource::new();
        let war_start = mock.fetch_war_start().unwrap().unwrap();
        let mut cursor = None;
        let mut pages = 0;
        let mut records = Vec::new();
        loop {
            let page = mock.fetch_attack_page(cursor).unwrap();
            pages += 1;
            records.extend(page.records);
            match page.next_older_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            assert!(pages < 10, "mock pagination must terminate");
        }
        assert_eq!(pages, 2);
        assert!(records.iter().any(|record| record.ts >= war_start));
        assert!(records.iter().any(|record| record.ts < war_start));
    }

    #[test]
    fn scripted_pages_are_addressed_by_cursor() {
        let mock = MockActivitySource::scripted();
        mock.set_pages(vec![
            Ok(AttackPage {
                records: Vec::new(),
                skipped: 0,
                next_older_cursor: Some(1),
            }),
            Err(ApiError::transient("timeout", "staged")),
        ]);
        assert!(mock.fetch_attack_page(None).is_ok());
        assert!(mock.fetch_attack_page(Some(1)).is_err());
        assert!(mock.fetch_attack_page(Some(7)).unwrap().records.is_empty());
        assert_eq!(mock.page_fetch_count(), 3);
    }

    #[test]
    fn scripted_chain_sequence_sticks_at_the_last_entry() {
        let mock = MockActivitySource::scripted();
        mock.push_chain_status(Ok(None));
        mock.push_chain_status(Ok(Some(ChainStatus {
            id: 9,
            timeout: 120,
            current: None,
            max: None,
            cooldown: None,
            start: None,
            end: None,
            modifier: None,
        })));
        assert!(mock.fetch_chain_status().unwrap().is_none());
        assert_eq!(mock.fetch_chain_status().unwrap().unwrap().id, 9);
        assert_eq!(mock.fetch_chain_status().unwrap().unwrap().id, 9);
        assert_eq!(mock.chain_fetch_count(), 3);
    }

    #[test]
    fn dev_chain_sequence_cycles() {
        let mock = MockActivitySource::new();
        let mut first_round = Vec::new();
        for _ in 0..8 {
            first_round.push(mock.fetch_chain_status().unwrap().map(|chain| chain.id));
        }
        let mut second_round = Vec::new();
        for _ in 0..8 {
            second_round.push(mock.fetch_chain_status().unwrap().map(|chain| chain.id));
        }
        assert_eq!(first_round, second_round);
        assert!(first_round.contains(&None));
        assert!(first_round.contains(&Some(1)));
        assert!(first_round.contains(&Some(2)));
    }
}
