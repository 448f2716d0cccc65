// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Field extraction from individual receipt lines

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::model::LineItem;

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:(?P<pre>[$£€₹]|\brs\.?|\binr|\busd|\beur|\bgbp)\s*)?(?P<int>\d{1,3}(?:,\d{3})+|\d+)\.(?P<frac>\d{2})\b(?P<post>\s*[$£€₹%])?",
    )
    .unwrap()
});

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b\d{4}-\d{1,2}-\d{1,2}\b
        | \b\d{1,2}[/.\-]\d{1,2}[/.\-](?:\d{4}|\d{2})\b
        | \b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+\d{4}\b
        | \b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b
        ",
    )
    .unwrap()
});

static SUBTOTAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsub[\s\-]?total\b").unwrap());

static TAX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:tax|gst|vat|hst|cgst|sgst|igst)\b").unwrap());

static TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:grand\s+total|total|amount\s+due|balance\s+due|balance|due|net\s+payable)\b")
        .unwrap()
});

static LEADING_TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\W*(?:grand\s+total|total|amount\s+due|balance\s+due|net\s+payable)\b").unwrap()
});

static ADJUSTMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:savings|saved|discount)\b").unwrap());

static PAYMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:change|cash|card|tender(?:ed)?|visa|mastercard|paid|payment|upi|savings|discount)\b")
        .unwrap()
});

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:tax\s+)?(?:invoice|receipt|bill|cash\s+memo)$").unwrap());

static QTY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?P<qty>\d{1,3})\s*[x×*]\s+(?P<desc>.+)$").unwrap());

static QTY_AT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?P<desc>.+?)\s+(?P<qty>\d{1,3})\s*@$").unwrap());

// 0.01 ..= 99999.99
static MIN_AMOUNT: Lazy<Decimal> = Lazy::new(|| Decimal::new(1, 2));
static MAX_AMOUNT: Lazy<Decimal> = Lazy::new(|| Decimal::new(9_999_999, 2));

/// A monetary value found on a line
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    pub value: Decimal,
    /// Currency marker printed next to the value, lowercased
    pub marker: Option<String>,
    /// Byte offset where the match starts in the line
    pub start: usize,
}

/// How a line reads, judged from its keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Total,
    Subtotal,
    Tax,
    Payment,
    Other,
}

/// A line that opens with a total keyword is a total even when it goes on to
/// mention tax or payment ("Total incl. VAT", "Total paid").
pub fn classify(text: &str) -> LineKind {
    if SUBTOTAL_RE.is_match(text) {
        LineKind::Subtotal
    } else if LEADING_TOTAL_RE.is_match(text) && !ADJUSTMENT_RE.is_match(text) {
        LineKind::Total
    } else if TAX_RE.is_match(text) {
        LineKind::Tax
    } else if PAYMENT_RE.is_match(text) {
        LineKind::Payment
    } else if TOTAL_RE.is_match(text) {
        LineKind::Total
    } else {
        LineKind::Other
    }
}

/// Monetary values on a line. Dates and percentages are not amounts.
pub fn amounts(text: &str) -> Vec<Amount> {
    let masked = mask_dates(text);
    AMOUNT_RE
        .captures_iter(&masked)
        .filter_map(|caps| {
            let post = caps.name("post").map(|m| m.as_str().trim());
            if post == Some("%") {
                return None;
            }
            let int = caps.name("int")?.as_str().replace(',', "");
            let frac = caps.name("frac")?.as_str();
            let value = Decimal::from_str(&format!("{}.{}", int, frac)).ok()?;
            if value < *MIN_AMOUNT || value > *MAX_AMOUNT {
                return None;
            }
            let marker = caps
                .name("pre")
                .map(|m| m.as_str())
                .or(post)
                .map(|m| m.trim_end_matches('.').to_lowercase());
            Some(Amount { value, marker, start: caps.get(0)?.start() })
        })
        .collect()
}

// Replace date tokens with spaces of the same byte length so offsets survive
fn mask_dates(text: &str) -> String {
    DATE_RE
        .replace_all(text, |caps: &regex::Captures| " ".repeat(caps[0].len()))
        .into_owned()
}

pub fn contains_date(text: &str) -> bool {
    DATE_RE.is_match(text)
}

/// First date on the line that parses with one of `formats`
pub fn find_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    DATE_RE.find_iter(text).find_map(|m| parse_date_token(m.as_str(), formats))
}

fn parse_date_token(token: &str, formats: &[String]) -> Option<NaiveDate> {
    let cleaned = token
        .replace(',', " ")
        .split_whitespace()
        .map(|w| {
            let w = w.trim_end_matches('.');
            if w.eq_ignore_ascii_case("sept") { "sep" } else { w }
        })
        .collect::<Vec<_>>()
        .join(" ");

    formats
        .iter()
        .filter_map(|f| NaiveDate::parse_from_str(&cleaned, f).ok())
        .find(|d| (1990..=2100).contains(&d.year()))
}

/// Currency code for a printed marker
pub fn currency_for_marker(marker: &str, hint: &str) -> Option<String> {
    let code = match marker {
        "£" | "gbp" => "GBP",
        "€" | "eur" => "EUR",
        "₹" | "rs" | "inr" => "INR",
        "usd" => "USD",
        // many currencies print "$"; trust the hint when it is one of them
        "$" if matches!(hint, "USD" | "CAD" | "AUD" | "NZD" | "SGD" | "HKD") => hint,
        "$" => "USD",
        _ => return None,
    };
    Some(code.to_string())
}

/// Read a purchased item from a line, if it looks like one
pub fn line_item(text: &str) -> Option<LineItem> {
    if classify(text) != LineKind::Other {
        return None;
    }
    let found = amounts(text);
    let first = found.first()?;
    let last = found.last()?;

    let description = text[..first.start]
        .trim()
        .trim_matches(|c: char| c == ':' || c == '-' || c == '*' || c == '.')
        .trim()
        .to_string();
    if description.chars().filter(|c| c.is_alphabetic()).count() < 2 {
        return None;
    }

    let priced_each = QTY_AT_RE
        .captures(&description)
        .map(|caps| (caps["desc"].trim().to_string(), caps["qty"].parse::<u32>().unwrap_or(0)));
    if let Some((desc, qty)) = priced_each {
        if qty > 0 && (found.len() == 1 || first.value * Decimal::from(qty) == last.value) {
            return Some(LineItem::new(desc, first.value, qty));
        }
        return Some(LineItem::new(description, last.value, 1));
    }

    let counted = QTY_PREFIX_RE
        .captures(&description)
        .map(|caps| (caps["desc"].trim().to_string(), caps["qty"].parse::<u32>().unwrap_or(0)));
    if let Some((desc, qty)) = counted {
        if qty > 0 {
            let unit = (last.value / Decimal::from(qty)).round_dp(2);
            if unit * Decimal::from(qty) == last.value {
                return Some(LineItem::new(desc, unit, qty));
            }
        }
    }

    Some(LineItem::new(description, last.value, 1))
}

/// Whether a line can name the merchant
pub fn is_merchant_candidate(text: &str) -> bool {
    text.chars().filter(|c| c.is_alphabetic()).count() >= 2
        && amounts(text).is_empty()
        && !contains_date(text)
        && classify(text) == LineKind::Other
        && !HEADER_RE.is_match(text.trim())
}
