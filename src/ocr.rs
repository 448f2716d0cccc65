// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! OCR collaborator: Google Cloud Vision text detection

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::OcrConfig;
use crate::{RaseedError, Result};

/// Axis-aligned box around a piece of recognised text, in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }
}

/// A run of recognised text, optionally with its position on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bounds: Option<BoundingBox>,
}

impl TextBlock {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), bounds: None }
    }

    pub fn positioned(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            bounds: Some(BoundingBox { x, y, width, height }),
        }
    }
}

/// Raw OCR output for one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    pub blocks: Vec<TextBlock>,
}

impl OcrDocument {
    /// Document made of line-ordered text without geometry
    pub fn from_text(text: &str) -> Self {
        Self { blocks: vec![TextBlock::plain(text)] }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.text.trim().is_empty())
    }
}

/// Anything that can turn image bytes into text
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, image: &[u8]) -> Result<OcrDocument>;
}

/// Google Cloud Vision REST client
pub struct VisionClient {
    client: Client,
    base_url: String,
    api_key: String,
    language_hints: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_context: Option<ImageContext>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    description: String,
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

// Vision omits zero coordinates
#[derive(Debug, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i64,
    #[serde(default)]
    y: i64,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

impl BoundingPoly {
    fn to_box(&self) -> Option<BoundingBox> {
        let min_x = self.vertices.iter().map(|v| v.x).min()?;
        let max_x = self.vertices.iter().map(|v| v.x).max()?;
        let min_y = self.vertices.iter().map(|v| v.y).min()?;
        let max_y = self.vertices.iter().map(|v| v.y).max()?;
        Some(BoundingBox {
            x: min_x as f32,
            y: min_y as f32,
            width: (max_x - min_x) as f32,
            height: (max_y - min_y) as f32,
        })
    }
}

impl AnnotateResponse {
    /// Validate the response shape and convert it into blocks.
    ///
    /// Word annotations (every entry after the first) carry geometry and are
    /// preferred; the first entry is the whole page as one string.
    pub(crate) fn into_document(self) -> Result<OcrDocument> {
        let response = match self.responses.into_iter().next() {
            Some(r) => r,
            None => return Ok(OcrDocument::default()),
        };

        if let Some(status) = response.error {
            return Err(RaseedError::OcrUnavailable(format!(
                "Vision rejected the image: {}",
                status.message
            )));
        }

        let mut annotations = response.text_annotations.into_iter();
        let full_text = match annotations.next() {
            Some(a) => a,
            None => return Ok(OcrDocument::default()),
        };

        let words: Vec<TextBlock> = annotations
            .filter_map(|a| {
                let bounds = a.bounding_poly.as_ref().and_then(BoundingPoly::to_box)?;
                Some(TextBlock { text: a.description, bounds: Some(bounds) })
            })
            .collect();

        if words.is_empty() {
            Ok(OcrDocument::from_text(&full_text.description))
        } else {
            Ok(OcrDocument { blocks: words })
        }
    }
}

impl VisionClient {
    /// Create a new Vision client
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            language_hints: config.language_hints.clone(),
        })
    }

    /// Check the service answers at all
    pub async fn health_check(&self) -> Result<()> {
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                RaseedError::OcrUnavailable(format!("Cannot connect to {}: {}", self.base_url, e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl OcrEngine for VisionClient {
    fn name(&self) -> &'static str {
        "google-vision"
    }

    async fn extract(&self, image: &[u8]) -> Result<OcrDocument> {
        if self.api_key.is_empty() {
            return Err(RaseedError::Config("Vision API key is not configured".to_string()));
        }

        let url = format!("{}/v1/images:annotate", self.base_url);
        let request = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent { content: general_purpose::STANDARD.encode(image) },
                features: vec![Feature { kind: "TEXT_DETECTION" }],
                image_context: if self.language_hints.is_empty() {
                    None
                } else {
                    Some(ImageContext { language_hints: self.language_hints.clone() })
                },
            }],
        };

        debug!("Sending {} bytes to Vision", image.len());

        let response = self.client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| RaseedError::OcrUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RaseedError::OcrUnavailable(format!(
                "Vision returned status {}",
                response.status()
            )));
        }

        let body: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| RaseedError::OcrUnavailable(format!("Malformed Vision response: {}", e)))?;
        body.into_document()
    }
}
