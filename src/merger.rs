// 🔀 Result Merger - the single dedup and ordering authority
//
// Strategies hand over independent result lists. The merger unions them in
// strategy order, keeps the first record per hash, sorts newest first and
// applies the inclusive date window.

use crate::error::{ExportError, ExportResult};
use crate::normalizer::NormalizedTransaction;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::HashSet;

// ============================================================================
// DATE BOUNDS
// ============================================================================

/// Inclusive [start, end] window in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn unbounded() -> Self {
        DateRange::default()
    }

    /// Parse optional ISO-8601 bounds (date or RFC 3339 datetime).
    /// A date-only end covers the whole day.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> ExportResult<Self> {
        let start = start
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_bound(s, Bound::Start))
            .transpose()?;
        let end = end
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_bound(s, Bound::End))
            .transpose()?;

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ExportError::EmptyRange {
                    start: s.to_rfc3339(),
                    end: e.to_rfc3339(),
                });
            }
        }

        Ok(DateRange { start, end })
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *at >= s) && self.end.map_or(true, |e| *at <= e)
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(input: &str, bound: Bound) -> ExportResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| ExportError::InvalidDate(input.to_string()))?;

    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
            .ok_or_else(|| ExportError::InvalidDate(input.to_string()))?,
    };

    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

// ============================================================================
// MERGE
// ============================================================================

/// Union in strategy order, dedup by hash (first wins), sort by timestamp desc
/// then hash asc, then filter by the inclusive date window
pub fn merge(strategy_results: Vec<Vec<NormalizedTransaction>>, range: &DateRange) -> Vec<NormalizedTransaction> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<NormalizedTransaction> = Vec::new();

    for results in strategy_results {
        for tx in results {
            if seen.insert(tx.hash.clone()) {
                merged.push(tx);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.hash.cmp(&b.hash))
    });

    if range.is_bounded() {
        merged.retain(|tx| range.contains(&tx.timestamp));
    }

    merged
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{Confidence, Provenance, TimestampSource};
    use std::collections::BTreeSet;

    fn tx(hash: &str, at: &str, memo: &str) -> NormalizedTransaction {
        NormalizedTransaction {
            hash: hash.to_string(),
            height: None,
            timestamp: DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc),
            from_address: String::new(),
            to_address: String::new(),
            amount: 1,
            denom: "actr".to_string(),
            fee: 0,
            memo: memo.to_string(),
            success: true,
            message_type: String::new(),
            event_types: BTreeSet::new(),
            counter_amount: None,
            counter_denom: None,
            timestamp_source: TimestampSource::Indexed,
            provenance: Provenance {
                strategy: "test".to_string(),
                confidence: Confidence::Decoded,
            },
        }
    }

    #[test]
    fn test_first_strategy_wins_on_duplicate_hash() {
        let first = vec![tx("0xaa", "2024-01-01T00:00:00Z", "from rpc")];
        let second = vec![tx("0xaa", "2024-01-01T00:00:00Z", "from kv")];

        let merged = merge(vec![first, second], &DateRange::unbounded());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].memo, "from rpc");
    }

    #[test]
    fn test_sorted_newest_first_then_hash() {
        let results = vec![
            tx("0xbb", "2024-01-01T00:00:00Z", ""),
            tx("0xcc", "2024-02-01T00:00:00Z", ""),
            tx("0xaa", "2024-01-01T00:00:00Z", ""),
        ];

        let merged = merge(vec![results], &DateRange::unbounded());
        let hashes: Vec<&str> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xcc", "0xaa", "0xbb"]);
    }

    #[test]
    fn test_no_duplicate_hashes() {
        let a = vec![tx("0x1", "2024-01-01T00:00:00Z", ""), tx("0x2", "2024-01-02T00:00:00Z", "")];
        let b = vec![tx("0x2", "2024-01-02T00:00:00Z", ""), tx("0x3", "2024-01-03T00:00:00Z", "")];

        let merged = merge(vec![a, b], &DateRange::unbounded());
        let unique: HashSet<&str> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_date_only_bounds_are_inclusive_days() {
        let results = vec![
            tx("0x1", "2023-12-31T23:59:59Z", ""),
            tx("0x2", "2024-01-01T00:00:00Z", ""),
            tx("0x3", "2024-01-31T23:59:59Z", ""),
            tx("0x4", "2024-02-01T00:00:00Z", ""),
        ];
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();

        let merged = merge(vec![results], &range);
        let hashes: Vec<&str> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["0x3", "0x2"]);
        assert!(merged.iter().all(|t| range.contains(&t.timestamp)));
    }

    #[test]
    fn test_single_bound() {
        let results = vec![
            tx("0x1", "2024-01-01T00:00:00Z", ""),
            tx("0x2", "2024-06-01T00:00:00Z", ""),
        ];
        let range = DateRange::parse(Some("2024-03-01T00:00:00Z"), None).unwrap();
        let merged = merge(vec![results], &range);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].hash, "0x2");
    }

    #[test]
    fn test_invalid_dates() {
        assert!(matches!(DateRange::parse(Some("yesterday"), None), Err(ExportError::InvalidDate(_))));
        assert!(matches!(
            DateRange::parse(Some("2024-02-01"), Some("2024-01-01")),
            Err(ExportError::EmptyRange { .. })
        ));
        assert_eq!(DateRange::parse(Some(""), None).unwrap(), DateRange::unbounded());
    }
}
