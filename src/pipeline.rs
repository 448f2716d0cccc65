// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Receipt ingestion: OCR, normalize, categorize, persist

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::categorizer::Categorizer;
use crate::config::{AppConfig, NormalizerConfig};
use crate::db::{self, ReceiptStore};
use crate::i18n::Locale;
use crate::model::Receipt;
use crate::normalizer::{self, DraftWarning, ExtractionHints};
use crate::ocr::OcrEngine;
use crate::{RaseedError, Result};

/// Whether the categorizer labelled the stored receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum AnalysisStatus {
    Categorized,
    /// Stored as uncategorized; analysis can be retried
    Deferred(String),
}

/// A receipt that reached the store
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub receipt: Receipt,
    pub analysis: AnalysisStatus,
    pub warnings: Vec<DraftWarning>,
}

impl ProcessOutcome {
    pub fn message(&self, locale: Locale) -> &'static str {
        let texts = locale.texts();
        match self.analysis {
            AnalysisStatus::Categorized => texts.receipt_processed,
            AnalysisStatus::Deferred(_) => texts.saved_unanalyzed,
        }
    }
}

/// User-facing text for a failed upload
pub fn failure_message(err: &RaseedError, locale: Locale) -> &'static str {
    let texts = locale.texts();
    match err {
        RaseedError::ParseFailure(_) | RaseedError::InvalidInput(_) => texts.could_not_read,
        RaseedError::AuthFailure(_) => texts.session_expired,
        _ => texts.could_not_save,
    }
}

/// Exponential backoff for store writes
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt - 1)
    }
}

pub struct ReceiptPipeline {
    ocr: Arc<dyn OcrEngine>,
    categorizer: Categorizer,
    store: Arc<dyn ReceiptStore>,
    normalizer: NormalizerConfig,
    ocr_timeout: Duration,
    retry: RetryPolicy,
}

impl ReceiptPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        categorizer: Categorizer,
        store: Arc<dyn ReceiptStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            ocr,
            categorizer,
            store,
            normalizer: config.normalizer.clone(),
            ocr_timeout: Duration::from_secs(config.ocr.timeout_secs),
            retry: RetryPolicy {
                retries: config.storage.retries,
                backoff: Duration::from_millis(config.storage.backoff_ms),
            },
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one upload through the whole pipeline.
    ///
    /// Nothing is stored on `ParseFailure` or when every write attempt fails.
    /// An unavailable categorizer still stores the receipt, uncategorized.
    pub async fn process(&self, owner_id: &str, image: &[u8], locale: Locale) -> Result<ProcessOutcome> {
        if image.is_empty() {
            return Err(RaseedError::InvalidInput("empty image".to_string()));
        }

        let id = db::receipt_id(owner_id, image);
        let document = tokio::time::timeout(self.ocr_timeout, self.ocr.extract(image))
            .await
            .map_err(|_| {
                RaseedError::OcrUnavailable(format!("{} timed out after {:?}", self.ocr.name(), self.ocr_timeout))
            })??;

        if document.is_empty() {
            return Err(RaseedError::ParseFailure("no text found in image".to_string()));
        }

        let now = Utc::now();
        let hints = ExtractionHints::for_locale(&self.normalizer, locale, now.date_naive());
        let draft = normalizer::normalize(&document, &hints)?;
        if draft.has_warnings() {
            debug!("Receipt {} normalized with warnings: {:?}", id, draft.warnings);
        }

        let warnings = draft.warnings.clone();
        let mut receipt = draft.into_receipt(id, owner_id.to_string(), db::image_hash(image), now)?;

        let analysis = match self.categorizer.categorize(&receipt, locale).await {
            Ok(analysis) => {
                receipt.category = analysis.category;
                receipt.insight = Some(analysis.insight);
                AnalysisStatus::Categorized
            }
            Err(RaseedError::AnalysisUnavailable(reason)) => {
                warn!("Storing receipt {} uncategorized: {}", receipt.id, reason);
                AnalysisStatus::Deferred(reason)
            }
            Err(e) => return Err(e),
        };

        self.persist(&receipt).await?;
        info!(
            "Stored receipt {} ({} {}, {})",
            receipt.id, receipt.total, receipt.currency, receipt.category
        );

        Ok(ProcessOutcome { receipt, analysis, warnings })
    }

    /// Re-run analysis on a stored receipt; the only path that mutates one
    pub async fn recategorize(&self, owner_id: &str, id: &str, locale: Locale) -> Result<Receipt> {
        let mut receipt = self
            .store
            .get(id)?
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| RaseedError::NotFound(format!("receipt {}", id)))?;

        let analysis = self.categorizer.categorize(&receipt, locale).await?;
        receipt.category = analysis.category;
        receipt.insight = Some(analysis.insight);
        receipt.updated_at = Utc::now();

        self.persist(&receipt).await?;
        Ok(receipt)
    }

    /// Retry analysis for every uncategorized receipt of an owner; returns how many succeeded
    pub async fn retry_uncategorized(&self, owner_id: &str, locale: Locale) -> Result<usize> {
        let pending = self.store.uncategorized(owner_id)?;
        let mut done = 0;

        for receipt in &pending {
            match self.recategorize(owner_id, &receipt.id, locale).await {
                Ok(_) => done += 1,
                Err(RaseedError::AnalysisUnavailable(reason)) => {
                    warn!("Receipt {} still uncategorized: {}", receipt.id, reason);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Categorized {}/{} pending receipts", done, pending.len());
        Ok(done)
    }

    async fn persist(&self, receipt: &Receipt) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.store.upsert(receipt) {
                Ok(()) => return Ok(()),
                Err(e @ RaseedError::StorageUnavailable(_)) if attempt < self.retry.retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!("Store write failed ({}), retrying in {:?} (attempt {})", e, delay, attempt + 1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::InferenceEngine;
    use crate::db::Database;
    use crate::model::Category;
    use crate::normalizer::MissingDatePolicy;
    use crate::ocr::OcrDocument;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};

    const RECEIPT_TEXT: &str = "Fresh Mart\n2024-03-09\nMilk 3.00\nBread 2.50\nTax 0.55\nTotal 6.05";

    struct TextOcr(&'static str);

    #[async_trait]
    impl OcrEngine for TextOcr {
        fn name(&self) -> &'static str {
            "text"
        }

        async fn extract(&self, _image: &[u8]) -> Result<OcrDocument> {
            Ok(OcrDocument::from_text(self.0))
        }
    }

    struct Scripted(&'static str);

    #[async_trait]
    impl InferenceEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Stalled;

    #[async_trait]
    impl InferenceEngine for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    /// Fails the first `failures` writes, then delegates
    struct Flaky {
        inner: Database,
        failures: u32,
        calls: AtomicU32,
    }

    impl ReceiptStore for Flaky {
        fn upsert(&self, receipt: &Receipt) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(RaseedError::StorageUnavailable("connection reset".to_string()));
            }
            self.inner.upsert(receipt)
        }

        fn get(&self, id: &str) -> Result<Option<Receipt>> {
            self.inner.get(id)
        }

        fn range(&self, owner_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Receipt>> {
            self.inner.range(owner_id, from, to)
        }

        fn delete(&self, id: &str) -> Result<bool> {
            self.inner.delete(id)
        }

        fn uncategorized(&self, owner_id: &str) -> Result<Vec<Receipt>> {
            self.inner.uncategorized(owner_id)
        }
    }

    const GROCERIES: &str = r#"{"category": "groceries", "insight": "Breakfast staples."}"#;

    fn pipeline(
        text: &'static str,
        engine: impl InferenceEngine + 'static,
        store: Arc<dyn ReceiptStore>,
        config: &AppConfig,
    ) -> ReceiptPipeline {
        let categorizer = Categorizer::new(Arc::new(engine), &config.llm).with_timeout(Duration::from_millis(20));
        ReceiptPipeline::new(Arc::new(TextOcr(text)), categorizer, store, config).with_retry(RetryPolicy {
            retries: 3,
            backoff: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn test_happy_path_stores_categorized_receipt() {
        let db = Database::in_memory().unwrap();
        let p = pipeline(RECEIPT_TEXT, Scripted(GROCERIES), Arc::new(db.clone()), &AppConfig::default());

        let outcome = p.process("u1", b"jpeg", Locale::English).await.unwrap();
        assert_eq!(outcome.analysis, AnalysisStatus::Categorized);
        assert_eq!(outcome.receipt.category, Category::Groceries);
        assert_eq!(outcome.message(Locale::English), Locale::English.texts().receipt_processed);

        let stored = db.get(&outcome.receipt.id).unwrap().unwrap();
        assert_eq!(stored, outcome.receipt);
        assert_eq!(stored.date, NaiveDate::from_ymd_opt(2024, 3, 9));
    }

    #[tokio::test]
    async fn test_categorizer_timeout_stores_uncategorized() {
        let db = Database::in_memory().unwrap();
        let p = pipeline(RECEIPT_TEXT, Stalled, Arc::new(db.clone()), &AppConfig::default());

        let outcome = p.process("u1", b"jpeg", Locale::Telugu).await.unwrap();
        assert!(matches!(outcome.analysis, AnalysisStatus::Deferred(_)));
        assert_eq!(outcome.message(Locale::Telugu), Locale::Telugu.texts().saved_unanalyzed);

        let stored = db.get(&outcome.receipt.id).unwrap().unwrap();
        assert_eq!(stored.category, Category::Uncategorized);
        assert_eq!(stored.insight, None);
    }

    #[tokio::test]
    async fn test_parse_failure_stores_nothing() {
        let db = Database::in_memory().unwrap();
        let p = pipeline(
            "Total $23.45\nMilk $3.00\nBread $2.50",
            Scripted(GROCERIES),
            Arc::new(db.clone()),
            &AppConfig::default(),
        );

        let err = p.process("u1", b"jpeg", Locale::English).await.unwrap_err();
        assert!(matches!(err, RaseedError::ParseFailure(_)));
        assert_eq!(failure_message(&err, Locale::English), Locale::English.texts().could_not_read);
        assert_eq!(db.receipt_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_allow_policy_keeps_undated_receipt() {
        let db = Database::in_memory().unwrap();
        let mut config = AppConfig::default();
        config.normalizer.missing_date = MissingDatePolicy::Allow;
        let p = pipeline("Total $23.45\nMilk $3.00\nBread $2.50", Scripted(GROCERIES), Arc::new(db.clone()), &config);

        let outcome = p.process("u1", b"jpeg", Locale::English).await.unwrap();
        assert_eq!(outcome.receipt.date, None);
        assert!(outcome.receipt.items.is_empty());
        assert_eq!(db.receipt_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reupload_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let p = pipeline(RECEIPT_TEXT, Scripted(GROCERIES), Arc::new(db.clone()), &AppConfig::default());

        let first = p.process("u1", b"same image", Locale::English).await.unwrap();
        let second = p.process("u1", b"same image", Locale::English).await.unwrap();
        assert_eq!(first.receipt.id, second.receipt.id);
        assert_eq!(db.receipt_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(Flaky { inner: db.clone(), failures: 2, calls: AtomicU32::new(0) });
        let p = pipeline(RECEIPT_TEXT, Scripted(GROCERIES), store.clone(), &AppConfig::default());

        p.process("u1", b"jpeg", Locale::English).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(db.receipt_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_down_gives_up_with_nothing_stored() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(Flaky { inner: db.clone(), failures: u32::MAX, calls: AtomicU32::new(0) });
        let p = pipeline(RECEIPT_TEXT, Scripted(GROCERIES), store.clone(), &AppConfig::default());

        let err = p.process("u1", b"jpeg", Locale::Kannada).await.unwrap_err();
        assert!(matches!(err, RaseedError::StorageUnavailable(_)));
        assert_eq!(failure_message(&err, Locale::Kannada), Locale::Kannada.texts().could_not_save);
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        assert_eq!(db.receipt_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_uncategorized_fills_in_category() {
        let db = Database::in_memory().unwrap();
        let config = AppConfig::default();
        let offline = pipeline(RECEIPT_TEXT, Stalled, Arc::new(db.clone()), &config);
        let stored = offline.process("u1", b"jpeg", Locale::English).await.unwrap().receipt;

        let online = pipeline(RECEIPT_TEXT, Scripted(GROCERIES), Arc::new(db.clone()), &config);
        assert_eq!(online.retry_uncategorized("u1", Locale::English).await.unwrap(), 1);

        let updated = db.get(&stored.id).unwrap().unwrap();
        assert_eq!(updated.category, Category::Groceries);
        assert_eq!(updated.insight.as_deref(), Some("Breakfast staples."));
        assert!(db.uncategorized("u1").unwrap().is_empty());

        let err = online.recategorize("u2", &stored.id, Locale::English).await.unwrap_err();
        assert!(matches!(err, RaseedError::NotFound(_)));
    }
}
