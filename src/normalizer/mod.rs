// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ingestion normalizer: raw OCR text in, receipt draft out
//!
//! The normalizer is a pure transform. Layout heuristics pick the total
//! (largest amount in the lowest region of the page); anything it had to
//! guess is reported back as a [`DraftWarning`] instead of hidden.

pub mod extract;
pub mod layout;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NormalizerConfig;
use crate::i18n::Locale;
use crate::model::{item_sum, Category, LineItem, Receipt};
use crate::ocr::OcrDocument;
use crate::{RaseedError, Result};

use extract::LineKind;
use layout::Line;

/// What to do with a receipt whose date cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MissingDatePolicy {
    /// Fail with `ParseFailure`
    #[default]
    Reject,
    /// Keep the receipt with no date
    Allow,
    /// Use the day the receipt was processed
    ProcessingDate,
}

/// Constraints that steer extraction
#[derive(Debug, Clone)]
pub struct ExtractionHints {
    /// ISO 4217 code assumed when the receipt prints no currency marker
    pub currency: String,
    /// chrono format strings, tried in order
    pub date_formats: Vec<String>,
    pub missing_date: MissingDatePolicy,
    pub max_items: usize,
    /// Date used by [`MissingDatePolicy::ProcessingDate`]
    pub today: NaiveDate,
}

impl ExtractionHints {
    pub fn for_locale(config: &NormalizerConfig, locale: Locale, today: NaiveDate) -> Self {
        let date_formats = if config.date_formats.is_empty() {
            locale.date_formats()
        } else {
            config.date_formats.clone()
        };
        Self {
            currency: config.currency.clone(),
            date_formats,
            missing_date: config.missing_date,
            max_items: config.max_items,
            today,
        }
    }
}

/// Where the draft's total came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TotalSource {
    /// A line labelled total / amount due / balance
    Labeled,
    /// Sum of line items plus tax
    ItemSum,
    /// Largest unlabelled amount near the bottom of the page
    Inferred,
}

/// Things the normalizer guessed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DraftWarning {
    /// Several different totals sat in the lowest region
    AmbiguousTotal { chosen: Decimal, alternatives: Vec<Decimal> },
    /// No labelled total or line items; the total is a best guess
    TotalInferred,
    /// Line items disagreed with the printed total and were dropped
    UnreconciledItems { item_sum: Decimal, total: Decimal },
    /// No date found; stored without one
    MissingDate,
    /// No date found; the processing date was used
    DateFromProcessing,
}

/// Unvalidated structured extraction, prior to persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub merchant: String,
    pub date: Option<NaiveDate>,
    pub currency: String,
    pub total: Decimal,
    pub tax: Decimal,
    pub items: Vec<LineItem>,
    pub total_source: TotalSource,
    pub raw_text: String,
    pub warnings: Vec<DraftWarning>,
}

impl ReceiptDraft {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Turn the draft into an uncategorized receipt, checking the total invariant
    pub fn into_receipt(
        self,
        id: String,
        owner_id: String,
        image_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Receipt> {
        let receipt = Receipt {
            id,
            owner_id,
            merchant: self.merchant,
            date: self.date,
            currency: self.currency,
            total: self.total,
            tax: self.tax,
            items: self.items,
            category: Category::Uncategorized,
            insight: None,
            raw_text: self.raw_text,
            image_hash,
            created_at: now,
            updated_at: now,
        };
        receipt.validate()?;
        Ok(receipt)
    }
}

struct Candidate {
    value: Decimal,
    position: f32,
}

/// Normalize OCR output into a receipt draft
pub fn normalize(document: &OcrDocument, hints: &ExtractionHints) -> Result<ReceiptDraft> {
    let lines = layout::reconstruct_lines(&document.blocks);
    if lines.is_empty() {
        return Err(RaseedError::ParseFailure("no text found in image".to_string()));
    }

    let (top, bottom) = layout::extent(&lines);
    let mut warnings = Vec::new();

    let tax = lines
        .iter()
        .filter(|l| extract::classify(&l.text) == LineKind::Tax)
        .filter_map(|l| extract::amounts(&l.text).into_iter().next())
        .map(|a| a.value)
        .sum::<Decimal>();

    let mut items: Vec<LineItem> = lines
        .iter()
        .filter_map(|l| extract::line_item(&l.text))
        .collect();
    items.truncate(hints.max_items);

    let labeled: Vec<Candidate> = candidates(&lines, |kind| kind == LineKind::Total);

    let total = if let Some(chosen) = lowest_region_max(&labeled, top, bottom, &mut warnings) {
        if let Some(sum) = item_sum(&items) {
            if sum + tax != chosen {
                debug!("Dropping {} line items: {} + tax {} != total {}", items.len(), sum, tax, chosen);
                warnings.push(DraftWarning::UnreconciledItems { item_sum: sum, total: chosen });
                items.clear();
            }
        }
        Some((chosen, TotalSource::Labeled))
    } else if let Some(sum) = item_sum(&items) {
        Some((sum + tax, TotalSource::ItemSum))
    } else {
        let loose = candidates(&lines, |kind| matches!(kind, LineKind::Other | LineKind::Total));
        lowest_region_max(&loose, top, bottom, &mut warnings).map(|value| {
            warnings.push(DraftWarning::TotalInferred);
            (value, TotalSource::Inferred)
        })
    };

    let date = lines.iter().find_map(|l| extract::find_date(&l.text, &hints.date_formats));

    let (total, total_source) = match (total, date) {
        (Some(t), _) => t,
        (None, None) => {
            return Err(RaseedError::ParseFailure("no total and no date found".to_string()))
        }
        (None, Some(_)) => return Err(RaseedError::ParseFailure("no total found".to_string())),
    };

    let date = match (date, hints.missing_date) {
        (Some(d), _) => Some(d),
        (None, MissingDatePolicy::Reject) => {
            return Err(RaseedError::ParseFailure("no transaction date found".to_string()))
        }
        (None, MissingDatePolicy::Allow) => {
            warnings.push(DraftWarning::MissingDate);
            None
        }
        (None, MissingDatePolicy::ProcessingDate) => {
            warnings.push(DraftWarning::DateFromProcessing);
            Some(hints.today)
        }
    };

    let merchant = lines
        .iter()
        .find(|l| extract::is_merchant_candidate(&l.text))
        .map(|l| l.text.chars().take(80).collect::<String>())
        .unwrap_or_else(|| "Unknown".to_string());

    let currency = lines
        .iter()
        .flat_map(|l| extract::amounts(&l.text))
        .find_map(|a| a.marker.and_then(|m| extract::currency_for_marker(&m, &hints.currency)))
        .unwrap_or_else(|| hints.currency.clone());

    Ok(ReceiptDraft {
        merchant,
        date,
        currency,
        total,
        tax,
        items,
        total_source,
        raw_text: lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n"),
        warnings,
    })
}

fn candidates(lines: &[Line], accept: impl Fn(LineKind) -> bool) -> Vec<Candidate> {
    lines
        .iter()
        .filter(|l| accept(extract::classify(&l.text)))
        .flat_map(|l| {
            extract::amounts(&l.text)
                .into_iter()
                .map(move |a| Candidate { value: a.value, position: l.position })
        })
        .collect()
}

/// Largest candidate in the lowest page third that has any candidates
fn lowest_region_max(
    candidates: &[Candidate],
    top: f32,
    bottom: f32,
    warnings: &mut Vec<DraftWarning>,
) -> Option<Decimal> {
    let region = candidates
        .iter()
        .map(|c| layout::band(c.position, top, bottom))
        .max()?;

    let mut values: Vec<Decimal> = candidates
        .iter()
        .filter(|c| layout::band(c.position, top, bottom) == region)
        .map(|c| c.value)
        .collect();
    values.sort();
    values.dedup();

    let chosen = *values.last()?;
    if values.len() > 1 {
        let alternatives = values[..values.len() - 1].to_vec();
        warnings.push(DraftWarning::AmbiguousTotal { chosen, alternatives });
    }
    Some(chosen)
}
