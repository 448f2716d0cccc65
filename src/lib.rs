// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Raseed: receipt ingestion and spending insight
//!
//! Receipt photos go through OCR, a normalizer that recovers merchant, date,
//! totals and line items, and a Gemini-backed categorizer. Results are kept in
//! SQLite per signed-in Google account and served through a small web UI.

pub mod assistant;
pub mod categorizer;
pub mod config;
pub mod db;
pub mod error;
pub mod gemini;
pub mod i18n;
pub mod identity;
pub mod model;
pub mod normalizer;
pub mod ocr;
pub mod pipeline;
pub mod web;

pub use config::AppConfig;
pub use error::{RaseedError, Result};
