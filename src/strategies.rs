use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::extract::{Document, TextOrigin, Word};
use crate::models::RawTransaction;

const DATE: &str = r"\d{1,2}/\d{1,2}(?:/\d{2,4})?";
const AMOUNT: &str = r"\(?-?\$?\s?-?[\d,]*\d\.\d{2}\)?(?:\s?(?i:CR)|-)?";
const MEMO_MAX_CHARS: usize = 80;
const SAMPLE_LINES: usize = 80;
/// Words closer than this (in points) vertically share a line.
const LINE_TOLERANCE: f64 = 2.5;

const SECTION_MARKERS: &[&str] = &["payments", "credits", "new charges", "purchases", "fees", "interest"];
const CREDIT_SECTIONS: &[&str] = &["payments", "credits"];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Statement amount to a signed decimal. Parentheses, a leading minus or a
/// trailing `CR`/minus mean negative. `None` when not a number.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    let mut negative = false;
    if s.len() >= 2 && s.get(s.len() - 2..).is_some_and(|t| t.eq_ignore_ascii_case("cr")) {
        negative = true;
        s = s[..s.len() - 2].trim_end();
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner;
    }
    let mut cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$' && *c != ',')
        .collect();
    if let Some(rest) = cleaned.strip_prefix('-') {
        negative = true;
        cleaned = rest.to_string();
    }
    if let Some(rest) = cleaned.strip_suffix('-') {
        negative = true;
        cleaned = rest.to_string();
    }
    if cleaned.is_empty()
        || !cleaned.chars().any(|c| c.is_ascii_digit())
        || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }
    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}

/// `MM/DD/YY`, `MM/DD/YYYY`, or `MM/DD` with the year taken from the
/// statement closing date (previous year when it would land after closing).
pub fn parse_date(raw: &str, closing: Option<NaiveDate>) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();
    match parts.len() {
        3 => NaiveDate::parse_from_str(raw, "%m/%d/%y")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
            .ok(),
        2 => {
            let closing = closing?;
            let m: u32 = parts[0].parse().ok()?;
            let d: u32 = parts[1].parse().ok()?;
            let date = NaiveDate::from_ymd_opt(closing.year(), m, d)?;
            if date > closing {
                NaiveDate::from_ymd_opt(closing.year() - 1, m, d)
            } else {
                Some(date)
            }
        }
        _ => None,
    }
}

fn generic_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^\s*(?P<date>{DATE})\s+(?P<memo>.+?)\s+(?P<amount>{AMOUNT})\s*$"
        ))
        .expect("generic line pattern")
    })
}

fn leading_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^\s*(?P<date>{DATE})(?:\s+(?P<rest>.*))?$")).expect("leading date pattern")
    })
}

fn trailing_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?:^|\s)(?P<amount>{AMOUNT})\s*$")).expect("trailing amount pattern")
    })
}

fn ending_in_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<kind>card|account)\s+(?:number\s+)?ending\s+in\s+(?P<digits>\d{4})\b")
            .expect("ending-in pattern")
    })
}

fn ocr_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(?P<date>[0-9OIl]{1,2}[/.\-][0-9OIl]{1,2}(?:[/.\-][0-9OIl]{2,4})?)\s+",
            r"(?P<memo>.+?)\s+",
            r"(?P<amount>\(?-?[$Ss]?\s?-?[0-9OIl,.]*[0-9OIl][.,][0-9OIl]{2}\)?(?:\s?(?i:CR)|-)?)\s*$"
        ))
        .expect("ocr line pattern")
    })
}

/// Drop a second leading date (card statements print transaction and
/// posting dates side by side).
fn strip_leading_date(memo: &str) -> &str {
    match leading_date_re().captures(memo) {
        Some(caps) => caps.name("rest").map_or("", |m| m.as_str()),
        None => memo,
    }
}

fn truncate_memo(memo: &str) -> String {
    memo.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MEMO_MAX_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// The single-line scanner: `<date> <memo> <amount>`.
pub fn parse_generic_line(line: &str, closing: Option<NaiveDate>) -> Option<RawTransaction> {
    let caps = generic_line_re().captures(line)?;
    let date = parse_date(&caps["date"], closing)?;
    let amount = parse_amount(&caps["amount"])?;
    let memo = truncate_memo(strip_leading_date(&caps["memo"]));
    if memo.is_empty() {
        return None;
    }
    Some(RawTransaction {
        date,
        memo,
        amount,
        source_label: None,
    })
}

/// Line-by-line scan for documents no strategy claims. Section headings are
/// still honored so unsigned rows under "Payments"/"Credits" come out negative.
fn parse_generic(doc: &Document, closing: Option<NaiveDate>) -> Vec<RawTransaction> {
    let mut rows = Vec::new();
    let mut credit_section = false;
    for line in doc.lines() {
        if let Some(marker) = section_marker(line) {
            credit_section = CREDIT_SECTIONS.contains(&marker);
            continue;
        }
        if let Some(mut row) = parse_generic_line(line, closing) {
            if credit_section && row.amount > Decimal::ZERO {
                row.amount = -row.amount;
            }
            rows.push(row);
        }
    }
    rows
}

fn is_summary_line(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    lower.starts_with("total")
        || lower.contains("beginning balance")
        || lower.contains("ending balance")
        || lower.contains("previous balance")
        || lower.contains("new balance")
}

// ---------------------------------------------------------------------------
// Strategy kinds, dispatched centrally
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MultilineBlock,
    Tabular,
    PositionalWord,
    OpticalFallback,
}

impl StrategyKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::MultilineBlock => "multiline_block",
            Self::Tabular => "tabular",
            Self::PositionalWord => "positional_word",
            Self::OpticalFallback => "optical_fallback",
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::MultilineBlock => detect_multiline_block(doc),
            Self::Tabular => detect_tabular(doc),
            Self::PositionalWord => doc.has_words(),
            Self::OpticalFallback => doc.origin == TextOrigin::Ocr,
        }
    }

    pub fn parse(&self, doc: &Document, closing: Option<NaiveDate>) -> Vec<RawTransaction> {
        match self {
            Self::MultilineBlock => parse_multiline_block(doc, closing),
            Self::Tabular => parse_tabular(doc, closing),
            Self::PositionalWord => parse_positional(doc, closing),
            Self::OpticalFallback => parse_optical(doc, closing),
        }
    }
}

/// Priority order; the first strategy that matches wins.
pub const ALL_STRATEGIES: &[StrategyKind] = &[
    StrategyKind::MultilineBlock,
    StrategyKind::Tabular,
    StrategyKind::PositionalWord,
    StrategyKind::OpticalFallback,
];

pub const GENERIC_KEY: &str = "generic";

pub fn select(doc: &Document) -> Option<StrategyKind> {
    ALL_STRATEGIES.iter().find(|s| s.matches(doc)).copied()
}

pub struct ParsedDocument {
    /// `None` when no strategy matched and the generic scanner ran.
    pub strategy: Option<StrategyKind>,
    pub rows: Vec<RawTransaction>,
}

impl ParsedDocument {
    pub fn strategy_key(&self) -> &'static str {
        self.strategy.map_or(GENERIC_KEY, |s| s.key())
    }
}

pub fn parse_document(doc: &Document, closing: Option<NaiveDate>) -> ParsedDocument {
    let strategy = select(doc);
    let rows = match strategy {
        Some(kind) => kind.parse(doc, closing),
        None => parse_generic(doc, closing),
    };
    debug!(
        strategy = strategy.map_or(GENERIC_KEY, |s| s.key()),
        rows = rows.len(),
        "parsed document"
    );
    ParsedDocument { strategy, rows }
}

// ---------------------------------------------------------------------------
// MultilineBlock
// ---------------------------------------------------------------------------

fn section_marker(line: &str) -> Option<&'static str> {
    let lower = line.trim().to_lowercase();
    if trailing_amount_re().is_match(&lower) || leading_date_re().is_match(&lower) {
        return None;
    }
    SECTION_MARKERS.iter().find(|m| lower.starts_with(*m)).copied()
}

fn detect_multiline_block(doc: &Document) -> bool {
    let sample: Vec<&str> = doc.lines().take(SAMPLE_LINES).collect();
    let has_marker = sample.iter().any(|l| section_marker(l).is_some());
    // a date line without its amount means the amount sits on a later line
    let has_open_block = sample.iter().any(|l| {
        leading_date_re().is_match(l) && !trailing_amount_re().is_match(l) && generic_line_re().captures(l).is_none()
    });
    has_marker && has_open_block
}

struct Block {
    date: String,
    memo: Vec<String>,
    amount: Option<Decimal>,
}

fn parse_multiline_block(doc: &Document, closing: Option<NaiveDate>) -> Vec<RawTransaction> {
    let mut rows = Vec::new();
    let mut current: Option<Block> = None;
    let mut label: Option<String> = None;
    let mut credit_section = false;

    let flush = |block: Option<Block>, label: &Option<String>, credit: bool, rows: &mut Vec<RawTransaction>| {
        let Some(block) = block else { return };
        let (Some(amount), Some(date)) = (block.amount, parse_date(&block.date, closing)) else {
            return;
        };
        let memo = truncate_memo(&block.memo.join(" "));
        if memo.is_empty() {
            return;
        }
        // unsigned amounts under a payments/credits heading are credits
        let amount = if credit && amount > Decimal::ZERO { -amount } else { amount };
        rows.push(RawTransaction {
            date,
            memo,
            amount,
            source_label: label.clone(),
        });
    };

    for line in doc.lines() {
        if let Some(caps) = ending_in_re().captures(line) {
            flush(current.take(), &label, credit_section, &mut rows);
            let kind = if caps["kind"].eq_ignore_ascii_case("card") { "Card" } else { "Account" };
            label = Some(format!("{kind} ending in {}", &caps["digits"]));
            continue;
        }
        if let Some(marker) = section_marker(line) {
            flush(current.take(), &label, credit_section, &mut rows);
            credit_section = CREDIT_SECTIONS.contains(&marker);
            continue;
        }
        if is_summary_line(line) {
            flush(current.take(), &label, credit_section, &mut rows);
            continue;
        }
        if let Some(caps) = leading_date_re().captures(line) {
            flush(current.take(), &label, credit_section, &mut rows);
            let rest = strip_leading_date(caps.name("rest").map_or("", |m| m.as_str()));
            let mut block = Block {
                date: caps["date"].to_string(),
                memo: Vec::new(),
                amount: None,
            };
            absorb_line(&mut block, rest);
            current = Some(block);
            continue;
        }
        if let Some(block) = current.as_mut() {
            absorb_line(block, line);
        }
    }
    flush(current.take(), &label, credit_section, &mut rows);
    rows
}

fn absorb_line(block: &mut Block, text: &str) {
    let mut text = text.trim();
    if block.amount.is_none() {
        if let Some(m) = trailing_amount_re().captures(text).and_then(|c| c.name("amount")) {
            if let Some(amount) = parse_amount(m.as_str()) {
                block.amount = Some(amount);
                text = text[..m.start()].trim();
            }
        }
    }
    if !text.is_empty() {
        block.memo.push(text.to_string());
    }
}

// ---------------------------------------------------------------------------
// Tabular
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Date,
    Description,
    Amount,
    Debit,
    Credit,
    Other,
}

#[derive(Debug, Clone)]
struct Column {
    role: ColumnRole,
    start: usize,
    end: usize,
}

/// Runs of text separated by two or more spaces, with char offsets.
fn split_runs(line: &str) -> Vec<(usize, usize, String)> {
    let chars: Vec<char> = line.chars().collect();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        while i < chars.len() {
            if chars[i].is_whitespace() {
                let gap = chars[i..].iter().take_while(|c| c.is_whitespace()).count();
                if gap >= 2 || i + gap >= chars.len() {
                    break;
                }
                i += gap;
                continue;
            }
            i += 1;
            end = i;
        }
        runs.push((start, end, chars[start..end].iter().collect()));
    }
    runs
}

fn classify_header_cell(cell: &str, have_date: bool) -> ColumnRole {
    let c = cell.to_lowercase();
    if ["description", "details", "payee", "merchant", "memo"].iter().any(|k| c.contains(k)) {
        ColumnRole::Description
    } else if c.contains("date") {
        if have_date { ColumnRole::Other } else { ColumnRole::Date }
    } else if c.contains("transaction") {
        ColumnRole::Description
    } else if c.contains("amount") {
        ColumnRole::Amount
    } else if ["debit", "withdrawal", "charges"].iter().any(|k| c.contains(k)) {
        ColumnRole::Debit
    } else if ["credit", "deposit", "payments"].iter().any(|k| c.contains(k)) {
        ColumnRole::Credit
    } else {
        ColumnRole::Other
    }
}

fn header_columns(line: &str) -> Option<Vec<Column>> {
    let runs = split_runs(line);
    if runs.len() < 3 {
        return None;
    }
    let mut columns: Vec<Column> = Vec::with_capacity(runs.len());
    for (start, end, text) in runs {
        let have_date = columns.iter().any(|c| c.role == ColumnRole::Date);
        columns.push(Column {
            role: classify_header_cell(&text, have_date),
            start,
            end,
        });
    }
    let has = |role| columns.iter().any(|c| c.role == role);
    let valid = has(ColumnRole::Date)
        && has(ColumnRole::Description)
        && (has(ColumnRole::Amount) || (has(ColumnRole::Debit) && has(ColumnRole::Credit)));
    valid.then_some(columns)
}

fn detect_tabular(doc: &Document) -> bool {
    doc.lines().take(SAMPLE_LINES).any(|l| header_columns(l).is_some())
}

/// Cut points at each header start, moved left so no token is split.
fn slice_by_columns(line: &str, columns: &[Column]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut cuts: Vec<usize> = columns
        .iter()
        .skip(1)
        .map(|c| {
            let mut b = c.start.min(chars.len());
            while b > 0 && b < chars.len() && !chars[b - 1].is_whitespace() && !chars[b].is_whitespace() {
                b -= 1;
            }
            b
        })
        .collect();
    cuts.insert(0, 0);
    cuts.push(chars.len());
    cuts.windows(2)
        .map(|w| {
            let (a, b) = (w[0].min(chars.len()), w[1].max(w[0]).min(chars.len()));
            chars[a..b].iter().collect::<String>().trim().to_string()
        })
        .collect()
}

/// Assign each two-space-separated run to the header column nearest its center.
fn assign_runs(line: &str, columns: &[Column]) -> Vec<String> {
    let mut cells = vec![String::new(); columns.len()];
    for (start, end, text) in split_runs(line) {
        let center = (start + end) as f64 / 2.0;
        let nearest = columns
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (center - (a.start + a.end) as f64 / 2.0).abs();
                let db = (center - (b.start + b.end) as f64 / 2.0).abs();
                da.total_cmp(&db)
            })
            .map(|(i, _)| i);
        if let Some(i) = nearest {
            if !cells[i].is_empty() {
                cells[i].push(' ');
            }
            cells[i].push_str(&text);
        }
    }
    cells
}

fn cell<'a>(cells: &'a [String], columns: &[Column], role: ColumnRole) -> &'a str {
    columns
        .iter()
        .position(|c| c.role == role)
        .and_then(|i| cells.get(i))
        .map(String::as_str)
        .unwrap_or("")
}

fn row_from_cells(cells: &[String], columns: &[Column], closing: Option<NaiveDate>) -> Option<RawTransaction> {
    let get = |role| cell(cells, columns, role);
    let date_cell = get(ColumnRole::Date);
    let date_token = date_cell.split_whitespace().next()?;
    let date = parse_date(date_token, closing)?;
    let memo = truncate_memo(get(ColumnRole::Description));
    if memo.is_empty() {
        return None;
    }
    let amount = if columns.iter().any(|c| c.role == ColumnRole::Amount) {
        parse_amount(get(ColumnRole::Amount))?
    } else {
        match (parse_amount(get(ColumnRole::Debit)), parse_amount(get(ColumnRole::Credit))) {
            (Some(debit), _) if !debit.is_zero() => debit.abs(),
            (_, Some(credit)) => -credit.abs(),
            _ => return None,
        }
    };
    Some(RawTransaction {
        date,
        memo,
        amount,
        source_label: None,
    })
}

fn parse_tabular(doc: &Document, closing: Option<NaiveDate>) -> Vec<RawTransaction> {
    let mut rows = Vec::new();
    let mut columns: Option<Vec<Column>> = None;
    for line in doc.lines() {
        if let Some(header) = header_columns(line) {
            columns = Some(header);
            continue;
        }
        let Some(cols) = columns.as_deref() else { continue };
        if is_summary_line(line) || !leading_date_re().is_match(line) {
            continue;
        }
        let row = row_from_cells(&slice_by_columns(line, cols), cols, closing)
            .or_else(|| row_from_cells(&assign_runs(line, cols), cols, closing));
        if let Some(row) = row {
            rows.push(row);
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// PositionalWord
// ---------------------------------------------------------------------------

/// Rebuild lines from positioned words: cluster on rounded y, order by x.
pub(crate) fn cluster_lines(words: &[Word]) -> Vec<String> {
    let mut sorted: Vec<&Word> = words.iter().collect();
    sorted.sort_by(|a, b| a.y.round().total_cmp(&b.y.round()).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<(f64, Vec<&Word>)> = Vec::new();
    for word in sorted {
        let y = word.y.round();
        match lines.last_mut() {
            Some((anchor, line)) if (y - *anchor).abs() <= LINE_TOLERANCE => line.push(word),
            _ => lines.push((y, vec![word])),
        }
    }
    lines
        .into_iter()
        .map(|(_, mut line)| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            line.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
        })
        .collect()
}

fn parse_positional(doc: &Document, closing: Option<NaiveDate>) -> Vec<RawTransaction> {
    doc.pages
        .iter()
        .flat_map(|page| cluster_lines(&page.words))
        .filter_map(|line| parse_generic_line(&line, closing))
        .collect()
}

// ---------------------------------------------------------------------------
// OpticalFallback
// ---------------------------------------------------------------------------

fn repair_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'O' => '0',
            'I' | 'l' => '1',
            'S' | 's' => '$',
            other => other,
        })
        .collect()
}

fn repair_amount(raw: &str) -> String {
    let mut s = repair_digits(raw);
    // "4,75" read for "4.75"
    if !s.contains('.') {
        if let Some(pos) = s.rfind(',') {
            let cents = s[pos + 1..].chars().take_while(char::is_ascii_digit).count();
            if cents == 2 {
                s.replace_range(pos..pos + 1, ".");
            }
        }
    }
    s
}

fn parse_optical(doc: &Document, closing: Option<NaiveDate>) -> Vec<RawTransaction> {
    doc.lines()
        .filter_map(|line| {
            let caps = ocr_line_re().captures(line)?;
            let date_raw = repair_digits(&caps["date"]).replace(['-', '.'], "/");
            let date = parse_date(&date_raw, closing)?;
            let amount = parse_amount(&repair_amount(&caps["amount"]))?;
            let memo = truncate_memo(&caps["memo"]);
            if memo.is_empty() {
                return None;
            }
            Some(RawTransaction {
                date,
                memo,
                amount,
                source_label: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Page;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("(1,234.56)"), Some(dec!(-1234.56)));
        assert_eq!(parse_amount("-$50.00"), Some(dec!(-50.00)));
        assert_eq!(parse_amount("45.00 CR"), Some(dec!(-45.00)));
        assert_eq!(parse_amount("12.50-"), Some(dec!(-12.50)));
        assert_eq!(parse_amount(" 4.75 "), Some(dec!(4.75)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("$"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("05/02/24", None), Some(ymd(2024, 5, 2)));
        assert_eq!(parse_date("5/2/2024", None), Some(ymd(2024, 5, 2)));
        assert_eq!(parse_date("13/02/24", None), None);
        assert_eq!(parse_date("05/02", None), None);
    }

    #[test]
    fn test_parse_date_infers_year_from_closing() {
        let closing = Some(ymd(2024, 1, 15));
        assert_eq!(parse_date("01/10", closing), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date("12/20", closing), Some(ymd(2023, 12, 20)));
    }

    #[test]
    fn test_generic_line() {
        let row = parse_generic_line("05/02/24 STARBUCKS STORE #123 $4.75", None).unwrap();
        assert_eq!(row.date, ymd(2024, 5, 2));
        assert_eq!(row.memo, "STARBUCKS STORE #123");
        assert_eq!(row.amount, dec!(4.75));
    }

    #[test]
    fn test_generic_line_with_posting_date_and_credit() {
        let closing = Some(ymd(2024, 5, 31));
        let row = parse_generic_line("05/03 05/04 AMAZON MKTP REFUND 19.99 CR", closing).unwrap();
        assert_eq!(row.date, ymd(2024, 5, 3));
        assert_eq!(row.memo, "AMAZON MKTP REFUND");
        assert_eq!(row.amount, dec!(-19.99));
    }

    #[test]
    fn test_generic_line_skips_garbage() {
        assert!(parse_generic_line("Account summary", None).is_none());
        assert!(parse_generic_line("99/99/24 BAD DATE 4.75", None).is_none());
    }

    #[test]
    fn test_plain_text_uses_generic_scanner() {
        let doc = Document::from_text("05/02/24 STARBUCKS STORE #123 $4.75\nnot a row");
        let parsed = parse_document(&doc, None);
        assert!(parsed.strategy.is_none());
        assert_eq!(parsed.strategy_key(), "generic");
        assert_eq!(parsed.rows.len(), 1);
    }

    #[test]
    fn test_generic_scanner_negates_rows_under_credit_headings() {
        let doc = Document::from_text(
            "Statement Closing Date 05/31/24\n\
             Payments and Other Credits\n\
             05/10 ONLINE PAYMENT THANK YOU 500.00\n\
             05/12 AMAZON MKTP REFUND 19.99 CR\n\
             Purchases\n\
             05/02 STARBUCKS 4.75\n\
             05/03 GITHUB INC 4.00\n",
        );
        let parsed = parse_document(&doc, Some(ymd(2024, 5, 31)));
        assert!(parsed.strategy.is_none());
        let rows: Vec<(&str, Decimal)> = parsed.rows.iter().map(|r| (r.memo.as_str(), r.amount)).collect();
        assert_eq!(
            rows,
            vec![
                ("ONLINE PAYMENT THANK YOU", dec!(-500.00)),
                ("AMAZON MKTP REFUND", dec!(-19.99)),
                ("STARBUCKS", dec!(4.75)),
                ("GITHUB INC", dec!(4.00)),
            ]
        );
    }

    const MULTILINE: &str = "\
Statement Closing Date 05/31/24
Card ending in 4321
Payments and Other Credits
05/10 ONLINE PAYMENT THANK YOU
   500.00
New Charges
05/02 05/03 BLUE BOTTLE COFFEE
OAKLAND CA
   12.40
05/04 HOTEL CHECKIN
DEPOSIT HOLD 210.00
Total New Charges 222.40
Card ending in 9876
Purchases
05/20 HARDWARE STORE
   35.00
";

    #[test]
    fn test_multiline_block_detected_and_parsed() {
        let doc = Document::from_text(MULTILINE);
        assert_eq!(select(&doc), Some(StrategyKind::MultilineBlock));
        let rows = StrategyKind::MultilineBlock.parse(&doc, Some(ymd(2024, 5, 31)));
        assert_eq!(rows.len(), 4);

        assert_eq!(rows[0].memo, "ONLINE PAYMENT THANK YOU");
        assert_eq!(rows[0].amount, dec!(-500.00));
        assert_eq!(rows[0].source_label.as_deref(), Some("Card ending in 4321"));

        assert_eq!(rows[1].date, ymd(2024, 5, 2));
        assert_eq!(rows[1].memo, "BLUE BOTTLE COFFEE OAKLAND CA");
        assert_eq!(rows[1].amount, dec!(12.40));

        assert_eq!(rows[2].memo, "HOTEL CHECKIN DEPOSIT HOLD");
        assert_eq!(rows[2].amount, dec!(210.00));

        assert_eq!(rows[3].source_label.as_deref(), Some("Card ending in 9876"));
    }

    #[test]
    fn test_multiline_memo_truncated() {
        let long = "X".repeat(120);
        let text = format!("Purchases\n05/02/24 {long}\n  9.99\n");
        let rows = StrategyKind::MultilineBlock.parse(&Document::from_text(&text), None);
        assert_eq!(rows[0].memo.chars().count(), MEMO_MAX_CHARS);
    }

    const TABULAR: &str = "\
Date        Description                      Amount
05/01/24    COFFEE SHOP                        4.75
05/02/24    PAYROLL DEPOSIT               -1,234.56
05/03/24    A VERY LONG MERCHANT NAME THAT RUNS PAST   12.00
Beginning balance                            100.00
";

    #[test]
    fn test_tabular_amount_column() {
        let doc = Document::from_text(TABULAR);
        assert_eq!(select(&doc), Some(StrategyKind::Tabular));
        let rows = StrategyKind::Tabular.parse(&doc, None);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].memo, "COFFEE SHOP");
        assert_eq!(rows[1].amount, dec!(-1234.56));
        assert_eq!(rows[2].memo, "A VERY LONG MERCHANT NAME THAT RUNS PAST");
        assert_eq!(rows[2].amount, dec!(12.00));
    }

    #[test]
    fn test_tabular_debit_credit_columns() {
        let text = "\
Posting Date   Transaction Description     Withdrawals    Deposits     Balance
05/01/24       RENT                            1,500.00                 2,000.00
05/02/24       CLIENT PAYMENT                                 800.00    2,800.00
";
        let rows = StrategyKind::Tabular.parse(&Document::from_text(text), None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, dec!(1500.00));
        assert_eq!(rows[1].amount, dec!(-800.00));
        assert_eq!(rows[1].memo, "CLIENT PAYMENT");
    }

    fn word(text: &str, x: f64, y: f64) -> Word {
        Word {
            text: text.to_string(),
            x,
            y,
        }
    }

    #[test]
    fn test_positional_words_tolerate_drift() {
        let words = vec![
            word("$4.75", 400.0, 101.2),
            word("05/02/24", 50.0, 100.1),
            word("STARBUCKS", 120.0, 100.4),
            word("05/03/24", 50.0, 120.0),
            word("LYFT", 120.0, 120.3),
            word("18.20", 400.0, 119.8),
        ];
        let doc = Document {
            pages: vec![Page {
                lines: vec!["irrelevant".to_string()],
                words,
            }],
            origin: TextOrigin::TextLayer,
        };
        assert_eq!(select(&doc), Some(StrategyKind::PositionalWord));
        let rows = StrategyKind::PositionalWord.parse(&doc, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].memo, "STARBUCKS");
        assert_eq!(rows[0].amount, dec!(4.75));
        assert_eq!(rows[1].memo, "LYFT");
    }

    #[test]
    fn test_optical_fallback_repairs_glyphs() {
        let doc = Document::from_pages(
            vec!["O5/O2/24 STARBUCKS STORE S4,75\n05/03/24 LYFT RIDE 18.2O".to_string()],
            TextOrigin::Ocr,
        );
        assert_eq!(select(&doc), Some(StrategyKind::OpticalFallback));
        let rows = StrategyKind::OpticalFallback.parse(&doc, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, ymd(2024, 5, 2));
        assert_eq!(rows[0].amount, dec!(4.75));
        assert_eq!(rows[1].amount, dec!(18.20));
    }

    #[test]
    fn test_optical_only_for_recognized_documents() {
        let doc = Document::from_text("05/02/24 STARBUCKS STORE S4,75");
        assert_ne!(select(&doc), Some(StrategyKind::OpticalFallback));
    }
}
