use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;

use crate::extract::Document;
use crate::models::SourceType;
use crate::strategies::parse_date;

const NUMERIC_DATE: &str = r"\d{1,2}/\d{1,2}/\d{2,4}";
const LONG_DATE: &str = r"[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}";

/// Validity window `[closing - W, closing]` for one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementPeriod {
    pub start: NaiveDate,
    pub closing: NaiveDate,
    /// Closing date came from a printed label rather than the latest date seen.
    pub labeled: bool,
}

impl StatementPeriod {
    pub fn new(closing: NaiveDate, source_type: SourceType, labeled: bool) -> Self {
        Self {
            start: closing - Duration::days(window_days(source_type)),
            closing,
            labeled,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.closing
    }
}

/// Card cycles are monthly; bank and loan statements can span a quarter.
pub fn window_days(source_type: SourceType) -> i64 {
    match source_type {
        SourceType::Card => 60,
        SourceType::Bank | SourceType::Loan => 90,
    }
}

fn closing_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let date = format!("(?:{NUMERIC_DATE}|{LONG_DATE})");
        Regex::new(&format!(
            r"(?i)(?:statement\s+closing\s+date|closing\s+date|statement\s+date|period\s+ending|ending\s+date)\s*:?\s*(?P<date>{date})(?:\s*(?:-|–|to|through)\s*(?P<end>{date}))?"
        ))
        .expect("closing label pattern")
    })
}

fn statement_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let date = format!("(?:{NUMERIC_DATE}|{LONG_DATE})");
        Regex::new(&format!(
            r"(?i)statement\s+period\s*:?\s*(?:from\s+)?{date}\s*(?:-|–|to|through)\s*(?P<end>{date})"
        ))
        .expect("statement period pattern")
    })
}

fn any_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"\b{NUMERIC_DATE}\b")).expect("date pattern"))
}

/// Numeric `MM/DD/YY[YY]` or `May 31, 2024` / `Jan. 5 2024`.
fn parse_label_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(date) = parse_date(raw, None) {
        return Some(date);
    }
    let cleaned = raw.replace(['.', ','], "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%B %d %Y", "%b %d %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

fn labeled_closing(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = statement_period_re().captures(text) {
        if let Some(date) = parse_label_date(&caps["end"]) {
            return Some(date);
        }
    }
    let caps = closing_label_re().captures(text)?;
    let raw = caps.name("end").or_else(|| caps.name("date"))?;
    parse_label_date(raw.as_str())
}

/// Closing date from a printed label, else the latest full date in the document.
pub fn resolve_period(doc: &Document, source_type: SourceType) -> Option<StatementPeriod> {
    let text = doc.full_text();
    if let Some(closing) = labeled_closing(&text) {
        return Some(StatementPeriod::new(closing, source_type, true));
    }
    any_date_re()
        .find_iter(&text)
        .filter_map(|m| parse_date(m.as_str(), None))
        .max()
        .map(|closing| StatementPeriod::new(closing, source_type, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_by_source_type() {
        assert_eq!(window_days(SourceType::Card), 60);
        assert_eq!(window_days(SourceType::Bank), 90);
        assert_eq!(window_days(SourceType::Loan), 90);
    }

    #[test]
    fn test_labeled_closing_date() {
        let doc = Document::from_text("ACME BANK\nClosing Date: 05/31/24\n05/02/24 COFFEE 4.75");
        let period = resolve_period(&doc, SourceType::Card).unwrap();
        assert_eq!(period.closing, ymd(2024, 5, 31));
        assert!(period.labeled);
        assert_eq!(period.start, ymd(2024, 4, 1));
    }

    #[test]
    fn test_statement_period_range_uses_end() {
        let doc = Document::from_text("Statement Period 04/01/2024 to 04/30/2024\n06/15/2024 Next statement");
        let period = resolve_period(&doc, SourceType::Bank).unwrap();
        assert_eq!(period.closing, ymd(2024, 4, 30));
    }

    #[test]
    fn test_opening_closing_range() {
        let doc = Document::from_text("Opening/Closing Date 04/02/24 - 05/01/24");
        assert_eq!(resolve_period(&doc, SourceType::Card).unwrap().closing, ymd(2024, 5, 1));
    }

    #[test]
    fn test_long_form_label() {
        let doc = Document::from_text("Statement Date: May 31, 2024");
        assert_eq!(resolve_period(&doc, SourceType::Bank).unwrap().closing, ymd(2024, 5, 31));
    }

    #[test]
    fn test_falls_back_to_latest_date() {
        let doc = Document::from_text("05/02/24 COFFEE 4.75\n05/20/2024 LUNCH 12.00\n04/30/24 GAS 30.00");
        let period = resolve_period(&doc, SourceType::Card).unwrap();
        assert_eq!(period.closing, ymd(2024, 5, 20));
        assert!(!period.labeled);
    }

    #[test]
    fn test_no_dates_no_period() {
        assert!(resolve_period(&Document::from_text("nothing here"), SourceType::Bank).is_none());
    }

    #[test]
    fn test_stale_line_outside_window() {
        let period = StatementPeriod::new(ymd(2024, 5, 31), SourceType::Card, true);
        assert!(!period.contains(ymd(2024, 1, 1)));
        assert!(period.contains(ymd(2024, 5, 2)));
        assert!(!period.contains(ymd(2024, 6, 1)));
    }
}
