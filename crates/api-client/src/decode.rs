use serde_json::Value;
use tracing::debug;

use warbot_core_types::{ActivityRecord, ChainStatus};

use crate::error::ApiError;

/// One page of outgoing attacks, newest first, plus the cursor for the
/// next older page when the API advertised one.
#[derive(Debug, Clone, Default)]
pub struct AttackPage {
    pub records: Vec<ActivityRecord>,
    pub skipped: u64,
    pub next_older_cursor: Option<i64>,
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().map(|v| v != 0).unwrap_or(false),
        _ => false,
    }
}

fn parse_attack_record(value: &Value) -> Option<ActivityRecord> {
    let id = value.get("id").and_then(value_to_i64)?;
    let ts = value.get("started").and_then(value_to_i64)?;
    let attacker_id = value.pointer("/attacker/id").and_then(value_to_i64);
    let attacker_name = value
        .pointer("/attacker/name")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let defender_id = value.pointer("/defender/id").and_then(value_to_i64);
    let ranked = value
        .get("is_ranked_war")
        .map(value_to_bool)
        .unwrap_or(false);
    let fair_fight = value
        .pointer("/modifiers/fair_fight")
        .and_then(value_to_f64);
    let respect = ["respect", "respect_gain", "respect_gained"]
        .iter()
        .find_map(|key| value.get(*key).and_then(value_to_f64));
    let result = value
        .get("result")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    Some(ActivityRecord {
        id,
        ts,
        attacker_id,
        attacker_name,
        defender_id,
        ranked,
        fair_fight,
        respect,
        result,
    })
}

/// Records that fail to decode are dropped individually and counted so a
/// single garbage entry never aborts a scan.
pub fn decode_attack_page(body: &Value) -> AttackPage {
    let mut page = AttackPage::default();
    let Some(attacks) = body.get("attacks").and_then(Value::as_array) else {
        debug!("attack page body carried no attacks array");
        return page;
    };
    for entry in attacks {
        match parse_attack_record(entry) {
            Some(record) => page.records.push(record),
            None => page.skipped += 1,
        }
    }
    page.next_older_cursor = body
        .pointer("/_metadata/links/prev")
        .and_then(Value::as_str)
        .and_then(extract_to_cursor);
    page
}

/// Pulls the `to` query parameter out of a pagination link.
pub(crate) fn extract_to_cursor(url: &str) -> Option<i64> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "to")
        .and_then(|(_, value)| value.parse::<i64>().ok())
}

/// A ranked war is live only when `wars.ranked.start` is a positive epoch.
pub fn decode_war_start(body: &Value) -> Option<i64> {
    body.pointer("/wars/ranked/start")
        .and_then(value_to_i64)
        .filter(|start| *start > 0)
}

/// A chain exists only when `chain.id` is positive; everything past the id
/// is best-effort because the API omits fields for idle chains.
pub fn decode_chain_status(body: &Value) -> Option<ChainStatus> {
    let chain = body.get("chain")?;
    let id = chain.get("id").and_then(value_to_i64).filter(|id| *id > 0)?;
    Some(ChainStatus {
        id,
        timeout: chain.get("timeout").and_then(value_to_i64).unwrap_or(0),
        current: chain.get("current").and_then(value_to_i64),
        max: chain.get("max").and_then(value_to_i64),
        cooldown: chain.get("cooldown").and_then(value_to_i64),
        start: chain.get("start").and_then(value_to_i64),
        end: chain.get("end").and_then(value_to_i64),
        modifier: chain.get("modifier").and_then(value_to_f64),
    })
}

/// The API reports failures inside a 200 body. Code 5 is the shared rate
/// limit, 8 and 9 are temporary platform outages, 2/13/16 mean the key is
/// unusable. Anything else is a request we built wrong.
pub(crate) fn classify_error_envelope(body: &Value) -> Option<ApiError> {
    let envelope = body.get("error").filter(|value| value.is_object())?;
    let code = envelope.get("code").and_then(value_to_i64);
    let message = envelope
        .get("error")
        .or_else(|| envelope.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("api error")
        .to_string();
    Some(match code {
        Some(5) => ApiError::transient("rate_limited", message),
        Some(8) | Some(9) => ApiError::transient("api_unavailable", message),
        Some(2) | Some(13) | Some(16) => ApiError::unauthorized("api_key_rejected", message),
        Some(other) => {
            ApiError::malformed("api_error_envelope", format!("code {other}: {message}"))
        }
        None => ApiError::malformed("api_error_envelope", message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attack_record_tolerates_numeric_strings() {
        let body = json!({
            "attacks": [{
                "id": "9001",
                "started": "1700000100",
                "attacker": {"id": 77, "name": "Raider"},
                "defender": {"id": "240"},
                "is_ranked_war": 1,
                "modifiers": {"fair_fight": "2.5"},
                "respect_gain": "6.25",
                "result": "Hospitalized"
            }]
        });
        let page = decode_attack_page(&body);
        assert_eq!(page.skipped, 0);
        let record = &page.records[0];
        assert_eq!(record.id, 9001);
        assert_eq!(record.ts, 1_700_000_100);
        assert_eq!(record.attacker_id, Some(77));
        assert_eq!(record.attacker_name.as_deref(), Some("Raider"));
        assert_eq!(record.defender_id, Some(240));
        assert!(record.ranked);
        assert_eq!(record.fair_fight, Some(2.5));
        assert_eq!(record.respect, Some(6.25));
    }

    #[test]
    fn attack_page_skips_and_counts_malformed_entries() {
        let body = json!({
            "attacks": [
                {"id": 1, "started": 1_700_000_100},
                {"id": 2},
                "garbage",
                {"started": 1_700_000_050}
            ]
        });
        let page = decode_attack_page(&body);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.skipped, 3);
        assert!(page.next_older_cursor.is_none());
    }

    #[test]
    fn attack_page_without_fair_fight_leaves_none() {
        let body = json!({
            "attacks": [{"id": 3, "started": 1_700_000_200, "is_ranked_war": true}]
        });
        let page = decode_attack_page(&body);
        assert_eq!(page.records[0].fair_fight, None);
        assert_eq!(page.records[0].respect, None);
    }

    #[test]
    fn prev_link_yields_older_cursor() {
        let body = json!({
            "attacks": [],
            "_metadata": {"links": {
                "prev": "https://api.torn.com/v2/faction/attacks?limit=100&sort=DESC&to=1700000462",
                "next": null
            }}
        });
        let page = decode_attack_page(&body);
        assert_eq!(page.next_older_cursor, Some(1_700_000_462));
    }

    #[test]
    fn prev_link_without_to_param_yields_no_cursor() {
        assert_eq!(
            extract_to_cursor("https://api.torn.com/v2/faction/attacks?limit=100"),
            None
        );
        assert_eq!(extract_to_cursor("not a url"), None);
    }

    #[test]
    fn war_start_requires_positive_epoch() {
        assert_eq!(
            decode_war_start(&json!({"wars": {"ranked": {"start": 1_700_000_000}}})),
            Some(1_700_000_000)
        );
        assert_eq!(decode_war_start(&json!({"wars": {"ranked": {"start": 0}}})), None);
        assert_eq!(decode_war_start(&json!({"wars": {"ranked": null}})), None);
        assert_eq!(decode_war_start(&json!({"wars": {}})), None);
    }

    #[test]
    fn chain_requires_positive_id() {
        assert!(decode_chain_status(&json!({"chain": {"id": 0, "timeout": 90}})).is_none());
        assert!(decode_chain_status(&json!({"chain": null})).is_none());
        let status = decode_chain_status(&json!({
            "chain": {"id": "412", "current": 38, "max": 100}
        }))
        .unwrap();
        assert_eq!(status.id, 412);
        assert_eq!(status.timeout, 0);
        assert_eq!(status.current, Some(38));
    }

    #[test]
    fn error_envelope_maps_codes_to_kinds() {
        let transient = classify_error_envelope(&json!({
            "error": {"code": 5, "error": "Too many requests"}
        }))
        .unwrap();
        assert!(transient.is_transient());
        assert_eq!(transient.code, "rate_limited");

        let unauthorized = classify_error_envelope(&json!({
            "error": {"code": "2", "error": "Incorrect key"}
        }))
        .unwrap();
        assert!(unauthorized.is_unauthorized());

        let malformed = classify_error_envelope(&json!({
            "error": {"code": 6, "error": "Incorrect ID"}
        }))
        .unwrap();
        assert!(!malformed.is_transient());
        assert!(!malformed.is_unauthorized());

        assert!(classify_error_envelope(&json!({"attacks": []})).is_none());
    }
}
