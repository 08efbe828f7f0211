//! Field normalizers.
//!
//! Every function here is total: unusable input comes back as
//! [`Field::Invalid`] carrying the raw text, blank input as [`Field::Empty`].
//! `modified` reports whether the canonical value differs from what the
//! source held, which feeds the review flag on a row.

use accord_core::cell::date_from_serial;
use accord_core::CellValue;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Value(T),
    Empty,
    Invalid(String),
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// A canonical value and whether normalization changed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalized<T> {
    pub field: Field<T>,
    pub modified: bool,
}

impl<T> Normalized<T> {
    fn value(value: T, modified: bool) -> Self {
        Self {
            field: Field::Value(value),
            modified,
        }
    }

    fn empty() -> Self {
        Self {
            field: Field::Empty,
            modified: false,
        }
    }

    fn invalid(raw: &str) -> Self {
        Self {
            field: Field::Invalid(raw.to_string()),
            modified: false,
        }
    }

    pub fn into_parts(self) -> (Field<T>, bool) {
        (self.field, self.modified)
    }
}

/// Display form and folded match key of a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameForms {
    pub display: String,
    pub key: String,
}

/// Amount in minor units (two decimals) with the detected currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Money {
    pub minor: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
}

/// ISO 4217 style code, stored inline to keep `Money` copyable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    fn from_code(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return None;
        }
        Some(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Text and names
// ---------------------------------------------------------------------------

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim and collapse internal whitespace.
pub fn clean_text(raw: &str) -> Normalized<String> {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Normalized::empty();
    }
    let modified = cleaned != raw;
    Normalized::value(cleaned, modified)
}

/// Folded match key: lowercase, every dotted/dotless I folds to `i`,
/// whitespace collapsed.
pub fn fold_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match ch {
            'İ' | 'I' | 'ı' => out.push('i'),
            // Combining dot above left over from a decomposed dotted capital I
            '\u{307}' if out.ends_with('i') => {}
            _ => out.extend(ch.to_lowercase()),
        }
    }
    out
}

fn lower_char(ch: char, out: &mut String) {
    match ch {
        'İ' | 'I' => out.push('i'),
        _ => out.extend(ch.to_lowercase()),
    }
}

fn title_case(cleaned: &str) -> String {
    let mut out = String::with_capacity(cleaned.len());
    let mut word_start = true;
    for ch in cleaned.chars() {
        if ch == ' ' || ch == '-' {
            out.push(ch);
            word_start = true;
        } else if ch == '\u{307}' && out.ends_with('i') {
            // dropped with its base letter's case change
        } else if word_start {
            out.extend(ch.to_uppercase());
            word_start = false;
        } else {
            lower_char(ch, &mut out);
        }
    }
    out
}

/// Person names that arrive in a single case are title-cased per word.
pub fn person_name(raw: &str) -> Normalized<NameForms> {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Normalized::empty();
    }
    let has_upper = cleaned.chars().any(char::is_uppercase);
    let has_lower = cleaned.chars().any(char::is_lowercase);
    let display = if has_upper != has_lower {
        title_case(&cleaned)
    } else {
        cleaned
    };
    let modified = display != raw;
    let key = fold_key(&display);
    Normalized::value(NameForms { display, key }, modified)
}

/// Company names keep their casing; only whitespace is cleaned.
pub fn company_name(raw: &str) -> Normalized<NameForms> {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Normalized::empty();
    }
    let modified = cleaned != raw;
    let key = fold_key(&cleaned);
    Normalized::value(NameForms { display: cleaned, key }, modified)
}

/// Uppercase, alphanumerics only: `"c-100"` becomes `"C100"`.
pub fn canonical_code(raw: &str) -> Normalized<String> {
    let code: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect();
    if code.is_empty() {
        return Normalized::empty();
    }
    let modified = code != raw;
    Normalized::value(code, modified)
}

/// Trim and lowercase. An address without a local part and a domain is invalid.
pub fn email(raw: &str) -> Normalized<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Normalized::empty();
    }
    let lowered = trimmed.to_lowercase();
    let valid = match lowered.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !lowered.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Normalized::invalid(raw);
    }
    let modified = lowered != raw;
    Normalized::value(lowered, modified)
}

/// Digits only, keeping a leading `+`.
pub fn phone(raw: &str) -> Normalized<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Normalized::empty();
    }
    let mut out = String::new();
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(char::is_ascii_digit));
    if !out.chars().any(|c| c.is_ascii_digit()) {
        return Normalized::invalid(raw);
    }
    let modified = out != raw;
    Normalized::value(out, modified)
}

// ---------------------------------------------------------------------------
// Numbers and money
// ---------------------------------------------------------------------------

/// A number split into sign and digit strings, with any currency marker.
#[derive(Debug, PartialEq)]
struct NumberParts {
    negative: bool,
    int: String,
    frac: String,
    currency: Option<Currency>,
}

const CURRENCY_SYMBOLS: &[(char, &str)] = &[
    ('$', "USD"),
    ('€', "EUR"),
    ('£', "GBP"),
    ('₺', "TRY"),
    ('¥', "JPY"),
];

enum Parsed {
    Blank,
    Invalid,
    Number(NumberParts),
}

fn strip_currency(s: &str) -> (String, Option<Currency>) {
    let mut currency = None;
    let mut rest = s.trim().to_string();

    for (symbol, code) in CURRENCY_SYMBOLS {
        if rest.contains(*symbol) {
            currency = Currency::from_code(code);
            rest = rest.replace(*symbol, " ");
        }
    }

    // Alphabetic code at either end, e.g. "USD 12", "12,50 TL"
    let leading: String = rest.trim_start().chars().take_while(|c| c.is_alphabetic()).collect();
    if let Some(code) = code_for(&leading) {
        currency.get_or_insert(code);
        rest = rest.trim_start()[leading.len()..].to_string();
    }
    let trailing: String = {
        let rev: String = rest.trim_end().chars().rev().take_while(|c| c.is_alphabetic()).collect();
        rev.chars().rev().collect()
    };
    if let Some(code) = code_for(&trailing) {
        currency.get_or_insert(code);
        let end = rest.trim_end().len() - trailing.len();
        rest.truncate(end);
    }

    (rest, currency)
}

const KNOWN_CODES: &[&str] = &["USD", "EUR", "GBP", "TRY", "JPY", "CHF"];

/// A currency word: `TL`, a known code in any case, or any three capitals.
fn code_for(word: &str) -> Option<Currency> {
    if word.eq_ignore_ascii_case("tl") {
        return Currency::from_code("TRY");
    }
    let known = KNOWN_CODES.iter().any(|c| c.eq_ignore_ascii_case(word));
    let capitals = word.len() == 3 && word.chars().all(|c| c.is_ascii_uppercase());
    if known || capitals {
        Currency::from_code(word)
    } else {
        None
    }
}

fn split_number(raw: &str) -> Parsed {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Parsed::Blank;
    }

    let (mut body, currency) = strip_currency(trimmed);
    // An unknown alphabetic marker (not a currency) makes the value unusable
    if body.chars().any(char::is_alphabetic) {
        return Parsed::Invalid;
    }

    let mut negative = false;
    let inner = body.trim();
    if inner.starts_with('(') && inner.ends_with(')') && inner.len() >= 2 {
        negative = true;
        body = inner[1..inner.len() - 1].to_string();
    }
    let mut inner = body.trim().to_string();
    if let Some(rest) = inner.strip_prefix('-') {
        negative = !negative;
        inner = rest.to_string();
    } else if let Some(rest) = inner.strip_suffix('-') {
        negative = !negative;
        inner = rest.to_string();
    } else if let Some(rest) = inner.strip_prefix('+') {
        inner = rest.to_string();
    }

    let digits: String = inner
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Parsed::Invalid;
    }
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return Parsed::Invalid;
    }

    let decimal = decimal_separator(&digits);
    let (int, frac) = match decimal {
        Some(pos) => (&digits[..pos], &digits[pos + 1..]),
        None => (digits.as_str(), ""),
    };
    if let Some(pos) = decimal {
        // The decimal separator may appear once; grouping uses the other one
        if int.contains(char::from(digits.as_bytes()[pos])) || frac.contains(['.', ',']) {
            return Parsed::Invalid;
        }
    }
    let int: String = int.chars().filter(char::is_ascii_digit).collect();

    let int = int.trim_start_matches('0').to_string();
    Parsed::Number(NumberParts {
        negative,
        int: if int.is_empty() { "0".to_string() } else { int },
        frac: frac.to_string(),
        currency,
    })
}

/// Byte position of the decimal separator, if any.
///
/// With both `.` and `,` present the last one is the decimal separator.
/// A lone separator that repeats is grouping. A single separator followed by
/// exactly three digits is grouping unless the integer part is zero.
fn decimal_separator(digits: &str) -> Option<usize> {
    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');
    match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(pos), None) | (None, Some(pos)) => {
            let sep = digits.as_bytes()[pos];
            let count = digits.bytes().filter(|b| *b == sep).count();
            if count > 1 {
                return None;
            }
            let int_part = &digits[..pos];
            let frac_len = digits.len() - pos - 1;
            let zero_int = int_part.trim_start_matches('0').is_empty();
            if frac_len == 3 && !zero_int {
                None
            } else {
                Some(pos)
            }
        }
        (None, None) => None,
    }
}

/// Locale-tolerant decimal parse.
pub fn parse_decimal(raw: &str) -> Normalized<f64> {
    match split_number(raw) {
        Parsed::Blank => Normalized::empty(),
        Parsed::Invalid => Normalized::invalid(raw),
        Parsed::Number(parts) => {
            let text = if parts.frac.is_empty() {
                parts.int.clone()
            } else {
                format!("{}.{}", parts.int, parts.frac)
            };
            match text.parse::<f64>() {
                Ok(v) => {
                    let value = if parts.negative { -v } else { v };
                    let modified = raw.trim().parse::<f64>().map_or(true, |p| p != value) || raw.trim() != raw;
                    Normalized::value(value, modified)
                }
                Err(_) => Normalized::invalid(raw),
            }
        }
    }
}

/// Decimal parse into minor units, rounding half away from zero.
pub fn parse_money(raw: &str) -> Normalized<Money> {
    match split_number(raw) {
        Parsed::Blank => Normalized::empty(),
        Parsed::Invalid => Normalized::invalid(raw),
        Parsed::Number(parts) => match to_minor(&parts) {
            Some(minor) => {
                let plain = raw.trim() == raw
                    && parts.currency.is_none()
                    && parts.frac.len() <= 2
                    && raw.parse::<f64>().is_ok_and(|p| (p * 100.0).round() as i64 == minor);
                let modified = !plain;
                Normalized::value(
                    Money {
                        minor,
                        currency: parts.currency,
                    },
                    modified,
                )
            }
            None => Normalized::invalid(raw),
        },
    }
}

fn to_minor(parts: &NumberParts) -> Option<i64> {
    let int: i64 = parts.int.parse().ok()?;
    let frac = parts.frac.as_bytes();
    let digit = |i: usize| frac.get(i).map(|b| i64::from(b - b'0')).unwrap_or(0);
    let mut cents = digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        cents += 1;
    }
    let magnitude = int.checked_mul(100)?.checked_add(cents)?;
    Some(if parts.negative { -magnitude } else { magnitude })
}

/// Render minor units as a plain decimal string.
pub fn format_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// ISO, day-first dotted and slashed, year-first slashed, or a serial number.
pub fn parse_date(raw: &str) -> Normalized<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Normalized::empty();
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Normalized::value(date, trimmed != raw);
    }
    // ISO with a time part ("2024-01-15 09:30:00", "2024-01-15T09:30")
    if let Some(prefix) = trimmed.get(..10) {
        let rest = &trimmed[10..];
        if rest.starts_with([' ', 'T']) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Normalized::value(date, true);
            }
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Normalized::value(date, true);
        }
    }
    if let Ok(serial) = trimmed.parse::<f64>() {
        if let Some(date) = date_from_serial(serial) {
            return Normalized::value(date, true);
        }
    }
    Normalized::invalid(raw)
}

// ---------------------------------------------------------------------------
// Cell-aware entry points
// ---------------------------------------------------------------------------

pub fn decimal_cell(cell: &CellValue) -> Normalized<f64> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Normalized::value(*n, false),
        other => parse_decimal(&other.to_text()),
    }
}

pub fn money_cell(cell: &CellValue) -> Normalized<Money> {
    match cell {
        CellValue::Number(n) if n.is_finite() => {
            let scaled = n * 100.0;
            if scaled.abs() >= i64::MAX as f64 {
                return Normalized::invalid(&cell.to_text());
            }
            let minor = scaled.round();
            Normalized::value(
                Money {
                    minor: minor as i64,
                    currency: None,
                },
                (minor - scaled).abs() > 1e-6,
            )
        }
        other => parse_money(&other.to_text()),
    }
}

pub fn date_cell(cell: &CellValue) -> Normalized<NaiveDate> {
    match cell {
        CellValue::Date(d) => Normalized::value(*d, false),
        CellValue::Number(n) => match date_from_serial(*n) {
            Some(d) => Normalized::value(d, true),
            None => Normalized::invalid(&cell.to_text()),
        },
        other => parse_date(&other.to_text()),
    }
}
