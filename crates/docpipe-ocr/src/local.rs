//! The local backend: an in-process detector/recognizer pair. Native
//! inference runtimes of this shape are typically bound to a single
//! thread or forbid concurrent calls into the same session, so access
//! is serialized through a `tokio::sync::Mutex` rather than relying on
//! the engine being `Sync`.

use crate::backend::{OcrBackend, PageImage};
use async_trait::async_trait;
use docpipe_types::{OcrPage, OcrTextBox};
use docpipe_utils::Result;
use tokio::sync::Mutex;

/// The actual detect+recognize call into a loaded model. Implementors
/// wrap whatever inference runtime is linked in (ONNX Runtime, a
/// Tesseract binding, etc.); this crate only owns the serialization
/// discipline around calling it.
pub trait InferenceEngine: Send {
    fn infer(&mut self, image_bytes: &[u8]) -> Result<Vec<OcrTextBox>>;
}

pub struct LocalCnnBackend {
    engine: Mutex<Box<dyn InferenceEngine>>,
}

impl LocalCnnBackend {
    #[must_use]
    pub fn new(engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }
}

#[async_trait]
impl OcrBackend for LocalCnnBackend {
    async fn recognize(&self, page: &PageImage) -> Result<OcrPage> {
        let mut engine = self.engine.lock().await;
        let boxes = engine.infer(&page.bytes)?;
        if boxes.is_empty() {
            return Ok(OcrPage {
                page_number: page.page_number,
                text: String::new(),
                boxes: Vec::new(),
                average_confidence: 0.0,
            });
        }
        let text = boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let average_confidence =
            boxes.iter().map(|b| b.confidence).sum::<f32>() / boxes.len() as f32;
        Ok(OcrPage {
            page_number: page.page_number,
            text,
            boxes,
            average_confidence,
        })
    }

    fn name(&self) -> &'static str {
        "local_cnn"
    }
}

/// An engine that always reports no detections, used as the `Err`-free
/// fallback when no real inference runtime is configured.
pub struct NullEngine;

impl InferenceEngine for NullEngine {
    fn infer(&mut self, _image_bytes: &[u8]) -> Result<Vec<OcrTextBox>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(Vec<OcrTextBox>);

    impl InferenceEngine for FixedEngine {
        fn infer(&mut self, _image_bytes: &[u8]) -> Result<Vec<OcrTextBox>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn averages_confidence_across_boxes() {
        let engine = FixedEngine(vec![
            OcrTextBox {
                text: "Invoice".into(),
                confidence: 0.9,
                bbox: (0, 0, 10, 10),
            },
            OcrTextBox {
                text: "Total".into(),
                confidence: 0.7,
                bbox: (0, 10, 10, 10),
            },
        ]);
        let backend = LocalCnnBackend::new(Box::new(engine));
        let page = PageImage {
            page_number: 1,
            bytes: vec![0u8; 4],
            mime_type: "image/png",
        };
        let result = backend.recognize(&page).await.unwrap();
        assert_eq!(result.text, "Invoice Total");
        assert!((result.average_confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn null_engine_yields_empty_page() {
        let backend = LocalCnnBackend::new(Box::new(NullEngine));
        let page = PageImage {
            page_number: 1,
            bytes: vec![],
            mime_type: "image/png",
        };
        let result = backend.recognize(&page).await.unwrap();
        assert!(result.text.is_empty());
        assert_eq!(result.average_confidence, 0.0);
    }
}
