// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Spending questions answered from recent receipts

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::categorizer::InferenceEngine;
use crate::config::LlmConfig;
use crate::i18n::Locale;
use crate::model::Receipt;
use crate::{RaseedError, Result};

#[derive(Serialize)]
struct ReceiptSummary<'a> {
    merchant: &'a str,
    date: Option<String>,
    total: String,
    currency: &'a str,
    category: &'a str,
    items: Vec<&'a str>,
}

impl<'a> From<&'a Receipt> for ReceiptSummary<'a> {
    fn from(r: &'a Receipt) -> Self {
        Self {
            merchant: &r.merchant,
            date: r.date.map(|d| d.to_string()),
            total: r.total.to_string(),
            currency: &r.currency,
            category: r.category.as_str(),
            items: r.items.iter().map(|i| i.description.as_str()).collect(),
        }
    }
}

pub struct Assistant {
    engine: Arc<dyn InferenceEngine>,
    timeout: Duration,
    context: usize,
}

impl Assistant {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: &LlmConfig) -> Self {
        Self {
            engine,
            timeout: Duration::from_secs(config.timeout_secs),
            context: config.assistant_context,
        }
    }

    /// Answer `question` using at most the configured number of receipts as context
    pub async fn ask(&self, question: &str, receipts: &[Receipt], locale: Locale) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RaseedError::InvalidInput("question is empty".to_string()));
        }

        let prompt = self.build_prompt(question, receipts, locale)?;

        let answer = tokio::time::timeout(self.timeout, self.engine.complete(&prompt))
            .await
            .map_err(|_| RaseedError::AnalysisUnavailable("assistant timed out".to_string()))?
            .map_err(|e| match e {
                RaseedError::AnalysisUnavailable(msg) => RaseedError::AnalysisUnavailable(msg),
                other => RaseedError::AnalysisUnavailable(other.to_string()),
            })?;

        Ok(answer.trim().to_string())
    }

    fn build_prompt(&self, question: &str, receipts: &[Receipt], locale: Locale) -> Result<String> {
        let summaries: Vec<ReceiptSummary> = receipts.iter().take(self.context).map(Into::into).collect();
        let context = serde_json::to_string_pretty(&summaries)?;

        Ok(format!(
            "You are a personal finance assistant.\n\
             The user's recent receipts:\n{context}\n\n\
             User question: {question}\n\n\
             Answer concisely in plain text, without markdown, in {language}.",
            language = locale.english_name(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    /// Remembers the last prompt it was given
    #[derive(Default)]
    struct Echo {
        last_prompt: Mutex<String>,
    }

    #[async_trait]
    impl InferenceEngine for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            Ok("  You spent 9.00 on dining.\n".to_string())
        }
    }

    fn receipt(n: usize) -> Receipt {
        let now = Utc::now();
        Receipt {
            id: format!("r{}", n),
            owner_id: "u1".to_string(),
            merchant: format!("Shop {}", n),
            date: None,
            currency: "USD".to_string(),
            total: Decimal::new(900, 2),
            tax: Decimal::ZERO,
            items: vec![],
            category: Category::Dining,
            insight: None,
            raw_text: String::new(),
            image_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_answer_uses_at_most_ten_receipts() {
        let engine = Arc::new(Echo::default());
        let assistant = Assistant::new(engine.clone(), &LlmConfig::default());
        let receipts: Vec<Receipt> = (0..15).map(receipt).collect();

        let answer = assistant.ask("How much on dining?", &receipts, Locale::Telugu).await.unwrap();
        assert_eq!(answer, "You spent 9.00 on dining.");

        let prompt = engine.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("\"Shop 9\""));
        assert!(!prompt.contains("\"Shop 10\""));
        assert!(prompt.contains("in Telugu"));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let assistant = Assistant::new(Arc::new(Echo::default()), &LlmConfig::default());
        let result = assistant.ask("   ", &[], Locale::English).await;
        assert!(matches!(result, Err(RaseedError::InvalidInput(_))));
    }
}
