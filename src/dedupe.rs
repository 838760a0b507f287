use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

/// A row ready for deduplication: parsed, period-filtered and normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub memo_raw: String,
    pub memo_clean: String,
    pub vendor_key: String,
    pub amount: Decimal,
    pub source: String,
}

pub struct DedupeResult {
    pub rows: Vec<NormalizedRow>,
    pub dropped: usize,
}

/// Keep the first occurrence of each (date, memo_clean, amount) in the batch.
pub fn dedupe_batch(rows: Vec<NormalizedRow>) -> DedupeResult {
    let mut seen: HashSet<(NaiveDate, String, Decimal)> = HashSet::new();
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;
    for row in rows {
        // normalize() so 4.5 and 4.50 collide
        let key = (row.date, row.memo_clean.clone(), row.amount.normalize());
        if seen.insert(key) {
            kept.push(row);
        } else {
            debug!(date = %row.date, memo = %row.memo_clean, "dropping duplicate row");
            dropped += 1;
        }
    }
    DedupeResult { rows: kept, dropped }
}
