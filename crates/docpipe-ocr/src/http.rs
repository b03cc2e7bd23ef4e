//! HTTP wrapper backend: posts a page image to a remote OCR service and
//! parses its JSON response, following the HTTP-backend shape
//! `xchecker-llm` uses for its provider backends.

use crate::backend::{OcrBackend, PageImage};
use async_trait::async_trait;
use docpipe_types::{job::OcrTextBox, OcrPage};
use docpipe_utils::{DocpipeError, Result};
use std::time::Duration;

pub struct HttpOcrBackend {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpOcrBackend {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[derive(serde::Deserialize)]
struct HttpOcrResponse {
    boxes: Vec<HttpOcrBox>,
}

#[derive(serde::Deserialize)]
struct HttpOcrBox {
    text: String,
    confidence: f32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl From<HttpOcrBox> for OcrTextBox {
    fn from(b: HttpOcrBox) -> Self {
        Self {
            text: b.text,
            confidence: b.confidence,
            bbox: (b.x, b.y, b.width, b.height),
        }
    }
}

#[async_trait]
impl OcrBackend for HttpOcrBackend {
    async fn recognize(&self, page: &PageImage) -> Result<OcrPage> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", page.mime_type)
            .body(page.bytes.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DocpipeError::Ocr(format!("OCR service request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(DocpipeError::Ocr(format!(
                "OCR service returned {status}"
            )));
        }

        let parsed: HttpOcrResponse = response
            .json()
            .await
            .map_err(|e| DocpipeError::Ocr(format!("malformed OCR service response: {e}")))?;

        let boxes: Vec<OcrTextBox> = parsed.boxes.into_iter().map(Into::into).collect();
        let text = boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let average_confidence = if boxes.is_empty() {
            0.0
        } else {
            boxes.iter().map(|b| b.confidence).sum::<f32>() / boxes.len() as f32
        };

        Ok(OcrPage {
            page_number: page.page_number,
            text,
            boxes,
            average_confidence,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
