//! Value normalization for extracted field text.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::template::FieldDataType;

lazy_static! {
    // Grouped thousands first ("1,250.75", "1\u{a0}250,75", "1.234.567"), then plain digits.
    // A plain space separates words, never digit groups.
    static ref NUMBER: Regex = Regex::new(
        r"(?P<open>\()?(?P<sign>[-\u{2212}]\s*)?(?P<num>\d{1,3}(?:[\u{00a0}\u{202f}.,']\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?)(?P<close>\))?"
    ).unwrap();

    static ref PERCENT: Regex = Regex::new(
        r"(?P<sign>[-\u{2212}]\s*)?(?P<num>\d{1,3}(?:[\u{00a0}\u{202f}.,']\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?)\s*%"
    ).unwrap();

    // YYYY-MM-DD, YYYY/MM/DD, YYYY.MM.DD
    static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b"
    ).unwrap();

    // DD.MM.YYYY, DD/MM/YYYY, DD-MM-YYYY (MM/DD/YYYY as fallback)
    static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})\b"
    ).unwrap();
}

/// A normalized field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Normalize reassembled field text according to its declared type.
pub fn normalize(text: &str, data_type: FieldDataType) -> Option<FieldValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match data_type {
        FieldDataType::Text => Some(FieldValue::Text(text.to_string())),
        FieldDataType::Date => parse_date(text).map(FieldValue::Date),
        FieldDataType::Integer => parse_value(text).map(|n| FieldValue::Number(n.round())),
        FieldDataType::Number | FieldDataType::Currency | FieldDataType::Percentage => {
            parse_value(text).map(FieldValue::Number)
        }
    }
}

/// A percentage as a fraction, otherwise the first number in the text.
pub fn parse_value(text: &str) -> Option<f64> {
    parse_percentage(text).or_else(|| parse_first_number(text))
}

/// Parse `<number>%` into a fraction ("42%" is 0.42).
pub fn parse_percentage(text: &str) -> Option<f64> {
    let caps = PERCENT.captures(text)?;
    let mut value = parse_number_token(&caps["num"])?;
    if caps.name("sign").is_some() {
        value = -value;
    }
    (value / Decimal::ONE_HUNDRED).to_f64()
}

/// Parse the first number embedded in the text.
///
/// Handles both `1,250.75` and `1 250,75` (no-break space) separator styles, a leading
/// minus sign and accounting parentheses.
pub fn parse_first_number(text: &str) -> Option<f64> {
    let caps = NUMBER.captures(text)?;
    let mut value = parse_number_token(&caps["num"])?;

    let parenthesized = caps.name("open").is_some() && caps.name("close").is_some();
    if caps.name("sign").is_some() || parenthesized {
        value = -value;
    }

    value.to_f64()
}

/// Parse a digit run with thousands and decimal separators.
pub fn parse_number_token(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both present: whichever comes last is the decimal separator
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(c), None) => {
            let decimals = cleaned.len() - c - 1;
            let single = cleaned.matches(',').count() == 1;
            if single && (decimals != 3 || cleaned.starts_with("0,")) {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Parse the first recognizable date in the text.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    for caps in DATE_YMD.captures_iter(text) {
        let year: i32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    for caps in DATE_DMY.captures_iter(text) {
        let first: u32 = caps[1].parse().unwrap_or(0);
        let second: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        let date = NaiveDate::from_ymd_opt(year, second, first)
            .or_else(|| NaiveDate::from_ymd_opt(year, first, second));
        if date.is_some() {
            return date;
        }
    }

    None
}
