//! Picking the task result to process.

use crate::types::TaskResult;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse a result timestamp. Accepts RFC 3339 and the common naive forms
/// (treated as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d.%m.%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Select the most recent result by `createdAt`.
///
/// Entries without a parseable timestamp are ignored; on a tie the first one
/// encountered wins. If no entry has a usable timestamp, the last entry in
/// input order is returned.
pub fn latest_result(results: &[TaskResult]) -> Option<&TaskResult> {
    let mut latest: Option<(DateTime<Utc>, &TaskResult)> = None;
    for result in results {
        let Some(ts) = result.created_at.as_deref().and_then(parse_timestamp) else {
            continue;
        };
        match latest {
            Some((best, _)) if ts <= best => {}
            _ => latest = Some((ts, result)),
        }
    }
    latest.map(|(_, r)| r).or_else(|| results.last())
}
