// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Receipt categorization through a language model

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::i18n::Locale;
use crate::model::{Category, Receipt};
use crate::{RaseedError, Result};

/// A text-in, text-out language model
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Category and insight assigned to one receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub category: Category,
    pub insight: String,
}

/// Shape the model is asked to answer with
#[derive(Debug, Deserialize)]
struct AnalysisReply {
    category: String,
    #[serde(default)]
    insight: String,
}

/// Assigns categories by prompting an inference engine
#[derive(Clone)]
pub struct Categorizer {
    engine: Arc<dyn InferenceEngine>,
    timeout: Duration,
    max_insight_chars: usize,
}

impl Categorizer {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: &LlmConfig) -> Self {
        Self {
            engine,
            timeout: Duration::from_secs(config.timeout_secs),
            max_insight_chars: config.max_insight_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the model for a category and insight.
    ///
    /// Every failure, including a timeout, is `AnalysisUnavailable`.
    pub async fn categorize(&self, receipt: &Receipt, locale: Locale) -> Result<Analysis> {
        let prompt = build_prompt(receipt, locale);
        debug!("Categorizing receipt {} with {}", receipt.id, self.engine.name());

        let reply = match tokio::time::timeout(self.timeout, self.engine.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(RaseedError::AnalysisUnavailable(msg))) => {
                return Err(RaseedError::AnalysisUnavailable(msg))
            }
            Ok(Err(e)) => return Err(RaseedError::AnalysisUnavailable(e.to_string())),
            Err(_) => {
                warn!("{} timed out after {:?}", self.engine.name(), self.timeout);
                return Err(RaseedError::AnalysisUnavailable(format!(
                    "no answer within {:?}",
                    self.timeout
                )));
            }
        };

        parse_reply(&reply, self.max_insight_chars)
    }
}

fn build_prompt(receipt: &Receipt, locale: Locale) -> String {
    let items = if receipt.items.is_empty() {
        "(not itemised)".to_string()
    } else {
        receipt
            .items
            .iter()
            .map(|i| format!("- {} x{} @ {}", i.description, i.quantity, i.unit_amount))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let labels = Category::ASSIGNABLE
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You categorize shopping receipts.\n\
         Merchant: {merchant}\n\
         Date: {date}\n\
         Total: {total} {currency}\n\
         Tax: {tax}\n\
         Items:\n{items}\n\n\
         Answer with a single JSON object and nothing else:\n\
         {{\"category\": one of [{labels}], \"insight\": one short sentence about this purchase written in {language}}}",
        merchant = receipt.merchant,
        date = receipt.date.map(|d| d.to_string()).unwrap_or_else(|| "unknown".to_string()),
        total = receipt.total,
        currency = receipt.currency,
        tax = receipt.tax,
        language = locale.english_name(),
    )
}

/// Validate a model answer into an [`Analysis`]
pub(crate) fn parse_reply(text: &str, max_insight_chars: usize) -> Result<Analysis> {
    let malformed = |why: &str| {
        RaseedError::AnalysisUnavailable(format!("malformed model answer ({}): {:.80}", why, text))
    };

    let unfenced = text.replace("```json", "").replace("```", "");
    let start = unfenced.find('{').ok_or_else(|| malformed("no object"))?;
    let end = unfenced.rfind('}').ok_or_else(|| malformed("no object"))?;
    if end < start {
        return Err(malformed("no object"));
    }

    let reply: AnalysisReply =
        serde_json::from_str(&unfenced[start..=end]).map_err(|e| malformed(&e.to_string()))?;

    let category: Category = reply.category.parse().map_err(|_| malformed("unknown category"))?;
    if !category.is_assigned() {
        return Err(malformed("unknown category"));
    }

    let insight = reply.insight.trim();
    if insight.is_empty() {
        return Err(malformed("empty insight"));
    }

    Ok(Analysis {
        category,
        insight: insight.chars().take(max_insight_chars).collect(),
    })
}
