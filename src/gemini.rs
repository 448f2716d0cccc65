// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gemini API client for hosted inference

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::categorizer::InferenceEngine;
use crate::config::LlmConfig;
use crate::{RaseedError, Result};

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(RaseedError::AnalysisUnavailable(
                "Gemini returned no candidates".to_string(),
            ));
        }
        Ok(text)
    }
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1) * 2))
            .build()?;

        // Accept both the bare host and a versioned base
        let base_url = config
            .url
            .trim_end_matches('/')
            .trim_end_matches("/v1beta")
            .to_string();

        Ok(Self {
            client,
            base_url,
            model: config.model.trim_start_matches("models/").to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn require_key(&self) -> Result<&str> {
        if self.api_key.is_empty() {
            return Err(RaseedError::AnalysisUnavailable(
                "Gemini API key is not configured".to_string(),
            ));
        }
        Ok(&self.api_key)
    }

    /// Check if Gemini is reachable with the configured key
    pub async fn health_check(&self) -> Result<()> {
        self.list_models().await.map(|_| ())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1beta/models", self.base_url);

        let response = self.client
            .get(&url)
            .query(&[("key", self.require_key()?)])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                RaseedError::AnalysisUnavailable(format!(
                    "Cannot connect to Gemini at {}: {}",
                    self.base_url, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(RaseedError::AnalysisUnavailable(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }

        let listing: ModelsResponse = response.json().await?;
        Ok(listing
            .models
            .into_iter()
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }

    /// Check if the configured model is offered
    pub async fn model_available(&self) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == &self.model))
    }

    /// Generate text completion
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        let request = GenerateRequest {
            contents: vec![Content { parts: vec![RequestPart { text: prompt }] }],
        };

        debug!("Sending request to Gemini: model={}", self.model);

        let response = self.client
            .post(&url)
            .query(&[("key", self.require_key()?)])
            .json(&request)
            .send()
            .await
            .map_err(|e| RaseedError::AnalysisUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RaseedError::AnalysisUnavailable(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RaseedError::AnalysisUnavailable(format!("Malformed Gemini response: {}", e)))?;
        result.into_text()
    }
}

#[async_trait]
impl InferenceEngine for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}
