//! Per-type cell coercion
//!
//! Each function turns one raw cell into an optional typed value. A value
//! that cannot be understood becomes absent and carries a warning; nothing
//! here ever rejects a row.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use url::Url;

use crate::domain::{split_investors, Cell, DealField, MAX_MONEY};

static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(usd|eur|gbp|cad|aud|chf|jpy)\b|us\$|[$€£¥]").unwrap());
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)(k|thousand|m|mm|mn|million|b|bn|billion)?$").unwrap()
});
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());
static TIME_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)[ T]\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?\s*(?i:am|pm)?.*$").unwrap());
static MONTH_YEAR_NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/-](\d{4})$").unwrap());
static YEAR_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());

/// Money cells that mean "not known" rather than "malformed"
const MONEY_PLACEHOLDERS: &[&str] = &[
    "-", "—", "–", "n/a", "na", "n.a.", "undisclosed", "not disclosed", "tbd", "tba", "unknown", "?",
];

/// Date formats tried in order; US month/day before day/month
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%m/%d/%y",
    "%d/%m/%y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
];

/// Spreadsheet epoch (serial day 0)
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// A value that could not be used as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionWarning {
    pub field: DealField,
    pub raw: String,
    pub message: String,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.field, self.raw, self.message)
    }
}

/// Outcome of coercing one cell
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced<T> {
    pub value: Option<T>,
    pub warning: Option<String>,
}

impl<T> Coerced<T> {
    fn absent() -> Self {
        Self { value: None, warning: None }
    }

    fn value(value: T) -> Self {
        Self { value: Some(value), warning: None }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self { value: None, warning: Some(message.into()) }
    }
}

/// Plain text: trimmed, empty becomes absent
pub fn coerce_text(cell: &Cell) -> Option<String> {
    let text = cell.as_text()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Money amount, rounded to cents
pub fn coerce_money(cell: &Cell) -> Coerced<Decimal> {
    match cell {
        Cell::Empty => Coerced::absent(),
        Cell::Bool(_) => Coerced::warn("not a monetary amount"),
        Cell::Number(n) => match Decimal::try_from(*n) {
            Ok(d) => within_storage_range(to_cents(d)),
            Err(_) => Coerced::warn("number out of range"),
        },
        Cell::Text(s) => parse_money(s),
    }
}

fn parse_money(raw: &str) -> Coerced<Decimal> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() || MONEY_PLACEHOLDERS.contains(&s.as_str()) {
        return Coerced::absent();
    }

    // Handle parentheses notation for negative numbers: (500) -> -500
    let (mut negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s.as_str())
    };

    let stripped = CURRENCY_RE.replace_all(s, "");
    let mut compact: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    if let Some(rest) = compact.strip_prefix(['-', '−']).map(str::to_string) {
        negative = !negative;
        compact = rest;
    }

    let Some(caps) = MONEY_RE.captures(&compact) else {
        return Coerced::warn("not a monetary amount");
    };

    let Ok(mut amount) = Decimal::from_str(&caps[1]) else {
        return Coerced::warn("not a monetary amount");
    };

    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        Some("k") | Some("thousand") => Some(Decimal::from(1_000u64)),
        Some("m") | Some("mm") | Some("mn") | Some("million") => Some(Decimal::from(1_000_000u64)),
        Some("b") | Some("bn") | Some("billion") => Some(Decimal::from(1_000_000_000u64)),
        _ => None,
    };
    if let Some(m) = multiplier {
        amount = match amount.checked_mul(m) {
            Some(v) => v,
            None => return Coerced::warn("number out of range"),
        };
    }

    if negative {
        amount = -amount;
    }

    within_storage_range(to_cents(amount))
}

fn within_storage_range(amount: Decimal) -> Coerced<Decimal> {
    if amount.abs() > MAX_MONEY {
        Coerced::warn(format!("amount exceeds the storable maximum of {}", MAX_MONEY))
    } else {
        Coerced::value(amount)
    }
}

fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Calendar date
///
/// Numeric cells are spreadsheet serial days, except whole numbers that read
/// as a plausible year.
pub fn coerce_date(cell: &Cell) -> Coerced<NaiveDate> {
    match cell {
        Cell::Empty => Coerced::absent(),
        Cell::Bool(_) => Coerced::warn("not a date"),
        Cell::Number(n) => {
            if n.fract() == 0.0 && (1900.0..=2100.0).contains(n) {
                return year_start(*n as i32).map_or_else(|| Coerced::warn("not a date"), Coerced::value);
            }
            match serial_to_date(*n) {
                Some(date) => Coerced::value(date),
                None => Coerced::warn("serial date out of range"),
            }
        }
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coerced::absent();
            }
            match parse_date(trimmed) {
                Some(date) => Coerced::value(date),
                None => Coerced::warn("unrecognized date"),
            }
        }
    }
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Years outside this range come from a format reading the wrong digits
fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (1900..=2200).contains(&date.year()).then_some(date)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let cleaned = ORDINAL_RE.replace_all(s, "$1");
    let s = cleaned.trim();

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(date) = plausible(date) {
                return Some(date);
            }
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return plausible(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return plausible(dt.date());
        }
    }
    if let Some(caps) = TIME_SUFFIX_RE.captures(s) {
        let date_part = &caps[1];
        if date_part != s {
            if let Some(date) = parse_date(date_part) {
                return Some(date);
            }
        }
    }

    // Month and year only: first of the month
    for fmt in ["%d %B %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {}", s), fmt) {
            return plausible(date);
        }
    }
    if let Some(caps) = MONTH_YEAR_NUMERIC_RE.captures(s) {
        let month: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1).and_then(plausible);
    }
    if let Some(caps) = YEAR_MONTH_RE.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1).and_then(plausible);
    }

    if YEAR_RE.is_match(s) {
        return s.parse().ok().and_then(year_start).and_then(plausible);
    }

    None
}

/// Link text; kept even when it does not look like a web URL
pub fn coerce_link(cell: &Cell) -> Coerced<String> {
    let Some(text) = coerce_text(cell) else {
        return Coerced::absent();
    };
    let warning = (!is_web_url(&text)).then(|| "not a valid http(s) URL".to_string());
    Coerced { value: Some(text), warning }
}

fn is_web_url(text: &str) -> bool {
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    let candidate = if text.contains("://") {
        text.to_string()
    } else {
        format!("https://{}", text)
    };
    match Url::parse(&candidate) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| h.contains('.') || h == "localhost")
        }
        Err(_) => false,
    }
}

/// Investor list, de-duplicated and re-joined with ", "
pub fn coerce_investors(cell: &Cell) -> Option<String> {
    let text = coerce_text(cell)?;
    let investors = split_investors(&text);
    if investors.is_empty() {
        None
    } else {
        Some(investors.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::from(s)
    }

    fn money(s: &str) -> Option<Decimal> {
        coerce_money(&text(s)).value
    }

    fn date(s: &str) -> Option<NaiveDate> {
        coerce_date(&text(s)).value
    }

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_money_strips_symbols_and_separators() {
        assert_eq!(money("$5,000,000"), Some(Decimal::new(5_000_000, 0)));
        assert_eq!(money("USD 1,250.5"), Some(Decimal::new(125_050, 2)));
        assert_eq!(money("€ 300"), Some(Decimal::new(300, 0)));
        assert_eq!(money("12.345"), Some(Decimal::new(1235, 2)));
    }

    #[test]
    fn test_money_suffixes() {
        assert_eq!(money("$5M"), Some(Decimal::new(5_000_000, 0)));
        assert_eq!(money("2.5 million"), Some(Decimal::new(2_500_000, 0)));
        assert_eq!(money("750k"), Some(Decimal::new(750_000, 0)));
        assert_eq!(money("$1.2bn"), Some(Decimal::new(1_200_000_000, 0)));
        assert_eq!(money("3MM"), Some(Decimal::new(3_000_000, 0)));
    }

    #[test]
    fn test_money_negative_forms() {
        assert_eq!(money("(500)"), Some(Decimal::new(-500, 0)));
        assert_eq!(money("-500"), Some(Decimal::new(-500, 0)));
        assert_eq!(money("-$1,000"), Some(Decimal::new(-1000, 0)));
    }

    #[test]
    fn test_money_placeholders_are_silent() {
        for raw in ["", "  ", "—", "-", "N/A", "undisclosed", "TBD", "Unknown"] {
            let coerced = coerce_money(&text(raw));
            assert_eq!(coerced.value, None, "{raw}");
            assert_eq!(coerced.warning, None, "{raw}");
        }
    }

    #[test]
    fn test_money_garbage_warns_and_never_zero_fills() {
        let coerced = coerce_money(&text("about five million"));
        assert_eq!(coerced.value, None);
        assert!(coerced.warning.is_some());
    }

    #[test]
    fn test_money_from_number_cell() {
        let coerced = coerce_money(&Cell::Number(5_000_000.0));
        assert_eq!(coerced.value, Some(Decimal::new(5_000_000, 0)));
        assert_eq!(coerce_money(&Cell::Empty).value, None);
    }

    #[test]
    fn test_money_beyond_storage_range_warns() {
        assert_eq!(MAX_MONEY.to_string(), "9999999999999999.99");
        assert_eq!(money("9999999999999999.99"), Some(MAX_MONEY));

        for cell in [text("$50,000,000bn"), text("-10000000000000000"), Cell::Number(1e17)] {
            let coerced = coerce_money(&cell);
            assert_eq!(coerced.value, None, "{cell:?}");
            assert!(coerced.warning.unwrap().contains("maximum"));
        }
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(date("2023-01-10"), ymd(2023, 1, 10));
        assert_eq!(date("01/10/2023"), ymd(2023, 1, 10));
        assert_eq!(date("25/01/2023"), ymd(2023, 1, 25));
        assert_eq!(date("2023/01/10"), ymd(2023, 1, 10));
        assert_eq!(date("01/10/23"), ymd(2023, 1, 10));
        assert_eq!(date("January 10, 2023"), ymd(2023, 1, 10));
        assert_eq!(date("Jan 10, 2023"), ymd(2023, 1, 10));
        assert_eq!(date("10 January 2023"), ymd(2023, 1, 10));
        assert_eq!(date("10th January 2023"), ymd(2023, 1, 10));
        assert_eq!(date("2023-01-10T09:30:00Z"), ymd(2023, 1, 10));
        assert_eq!(date("1/10/2023 0:00:00"), ymd(2023, 1, 10));
    }

    #[test]
    fn test_partial_dates() {
        assert_eq!(date("Jan 2023"), ymd(2023, 1, 1));
        assert_eq!(date("March 2021"), ymd(2021, 3, 1));
        assert_eq!(date("01/2023"), ymd(2023, 1, 1));
        assert_eq!(date("2023-04"), ymd(2023, 4, 1));
        assert_eq!(date("2023"), ymd(2023, 1, 1));
    }

    #[test]
    fn test_date_tbd_warns() {
        let coerced = coerce_date(&text("TBD"));
        assert_eq!(coerced.value, None);
        assert!(coerced.warning.is_some());

        let blank = coerce_date(&text("   "));
        assert_eq!(blank.value, None);
        assert_eq!(blank.warning, None);
    }

    #[test]
    fn test_date_from_number_cell() {
        // 44936 is 2023-01-10 in spreadsheet serial days
        assert_eq!(coerce_date(&Cell::Number(44936.0)).value, ymd(2023, 1, 10));
        assert_eq!(coerce_date(&Cell::Number(2023.0)).value, ymd(2023, 1, 1));
    }

    #[test]
    fn test_text_trims_and_drops_empty() {
        assert_eq!(coerce_text(&text("  Football ")), Some("Football".to_string()));
        assert_eq!(coerce_text(&text("   ")), None);
        assert_eq!(coerce_text(&Cell::Number(2023.0)), Some("2023".to_string()));
    }

    #[test]
    fn test_link_validation() {
        let ok = coerce_link(&text("acmefc.com"));
        assert_eq!(ok.value.as_deref(), Some("acmefc.com"));
        assert_eq!(ok.warning, None);

        assert_eq!(coerce_link(&text("https://news.example.org/a?b=1")).warning, None);

        let bad = coerce_link(&text("see press release"));
        assert_eq!(bad.value.as_deref(), Some("see press release"));
        assert!(bad.warning.is_some());

        assert!(coerce_link(&text("ftp://files.example.com")).warning.is_some());
    }

    #[test]
    fn test_investors_deduplicated() {
        assert_eq!(
            coerce_investors(&text("Sequoia;a16z, sequoia")),
            Some("Sequoia, a16z".to_string())
        );
        assert_eq!(coerce_investors(&text(" ; ")), None);
    }
}
