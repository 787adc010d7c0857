//! OCR over HTTP.
//!
//! The service exposes `GET /health`, answered once it has its model loaded,
//! and `POST /ocr` taking `{"image": "<base64>"}` and returning
//! `{"lines": [{"text": "...", "score": 0.93}]}`.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{RecognitionEngine, Recognizer};
use crate::config::RecognitionConfig;

pub struct HttpOcrEngine {
    endpoint: String,
    min_confidence: f32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OcrRequest {
    image: String,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    lines: Vec<OcrLine>,
}

#[derive(Debug, Deserialize)]
struct OcrLine {
    text: String,
    #[serde(default)]
    score: f32,
}

impl HttpOcrEngine {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            min_confidence: config.min_confidence,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl RecognitionEngine for HttpOcrEngine {
    fn acquire(&self) -> Result<Box<dyn Recognizer>> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();

        let url = format!("{}/health", self.endpoint);
        agent
            .get(&url)
            .call()
            .map_err(|e| anyhow!("OCR service not reachable at {}: {}", self.endpoint, e))?;

        Ok(Box::new(HttpRecognizer {
            agent,
            url: format!("{}/ocr", self.endpoint),
            min_confidence: self.min_confidence,
        }))
    }
}

struct HttpRecognizer {
    agent: ureq::Agent,
    url: String,
    min_confidence: f32,
}

impl Recognizer for HttpRecognizer {
    fn recognize(&mut self, image: &Path) -> Result<String> {
        let bytes = std::fs::read(image)
            .with_context(|| format!("Failed to read {}", image.display()))?;

        let request = OcrRequest {
            image: BASE64.encode(&bytes),
        };

        let response: OcrResponse = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| anyhow!("OCR request failed: {}", e))?
            .into_json()
            .map_err(|e| anyhow!("Failed to parse OCR response: {}", e))?;

        Ok(confident_text(&response.lines, self.min_confidence))
    }
}

/// Lines scoring above `min_confidence`, one per line.
fn confident_text(lines: &[OcrLine], min_confidence: f32) -> String {
    lines
        .iter()
        .filter(|line| line.score > min_confidence)
        .map(|line| line.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
