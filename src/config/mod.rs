// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Raseed

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::normalizer::MissingDatePolicy;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// OCR service settings
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// OAuth2 sign-in settings
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Extraction rules
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Write retry policy
    #[serde(default)]
    pub storage: StorageConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_vision_url")]
    pub url: String,
    /// Usually supplied through `VISION_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_language_hints")]
    pub language_hints: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_gemini_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Usually supplied through `GEMINI_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_insight_chars")]
    pub max_insight_chars: usize,
    #[serde(default = "default_context_receipts")]
    pub assistant_context: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NormalizerConfig {
    /// Currency assumed when none is printed
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Overrides the per-locale date formats when non-empty
    #[serde(default)]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub missing_date: MissingDatePolicy,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Largest accepted upload, in bytes
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_vision_url() -> String { "https://vision.googleapis.com".to_string() }
fn default_gemini_url() -> String { "https://generativelanguage.googleapis.com".to_string() }
fn default_model() -> String { "gemini-1.5-pro-latest".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_language_hints() -> Vec<String> {
    vec!["en".to_string(), "te".to_string(), "kn".to_string()]
}
fn default_insight_chars() -> usize { 280 }
fn default_context_receipts() -> usize { 10 }
fn default_redirect_uri() -> String { "http://localhost:8080/api/auth/google/callback".to_string() }
fn default_auth_url() -> String { "https://accounts.google.com/o/oauth2/v2/auth".to_string() }
fn default_token_url() -> String { "https://oauth2.googleapis.com/token".to_string() }
fn default_userinfo_url() -> String { "https://openidconnect.googleapis.com/v1/userinfo".to_string() }
fn default_currency() -> String { "USD".to_string() }
fn default_max_items() -> usize { 50 }
fn default_retries() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 200 }
fn default_busy_timeout_ms() -> u64 { 5000 }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }
fn default_max_upload() -> usize { 10 * 1024 * 1024 }
fn default_db_path() -> String { "raseed.db".to_string() }

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            url: default_vision_url(),
            api_key: None,
            timeout_secs: default_timeout(),
            language_hints: default_language_hints(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_gemini_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            max_insight_chars: default_insight_chars(),
            assistant_context: default_context_receipts(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            date_formats: Vec::new(),
            missing_date: MissingDatePolicy::default(),
            max_items: default_max_items(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::RaseedError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill secrets and deployment settings from the process environment
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("VISION_API_KEY").or_else(|| var("GOOGLE_API_KEY")) {
            self.ocr.api_key = Some(key);
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(id) = var("GOOGLE_CLIENT_ID") {
            self.identity.client_id = Some(id);
        }
        if let Some(secret) = var("GOOGLE_CLIENT_SECRET") {
            self.identity.client_secret = Some(secret);
        }
        if let Some(uri) = var("REDIRECT_URI") {
            self.identity.redirect_uri = uri;
        }
        if let Some(path) = var("RASEED_DB") {
            self.database.path = path;
        }
    }

    /// Problems that would stop the service from working
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let missing = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        if missing(&self.ocr.api_key) {
            problems.push("ocr.api_key is not set (VISION_API_KEY)".to_string());
        }
        if missing(&self.llm.api_key) {
            problems.push("llm.api_key is not set (GEMINI_API_KEY)".to_string());
        }
        if missing(&self.identity.client_id) || missing(&self.identity.client_secret) {
            problems.push("identity client id/secret are not set (GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET)".to_string());
        }
        if url::Url::parse(&self.identity.redirect_uri).is_err() {
            problems.push(format!("identity.redirect_uri is not a URL: {}", self.identity.redirect_uri));
        }
        if self.normalizer.currency.len() != 3 {
            problems.push(format!("normalizer.currency must be an ISO 4217 code, got '{}'", self.normalizer.currency));
        }
        for format in &self.normalizer.date_formats {
            if !format.contains('%') {
                problems.push(format!("normalizer.date_formats entry '{}' has no fields", format));
            }
        }
        if self.normalizer.max_items == 0 {
            problems.push("normalizer.max_items must be at least 1".to_string());
        }
        if self.ocr.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            problems.push("timeouts must be at least one second".to_string());
        }

        problems
    }
}
