//! The `OcrBackend` trait, grounded on the backend-trait shape in
//! `xchecker-llm/src/types.rs` (one `invoke`-style async method,
//! `Send + Sync`, boxable for dynamic dispatch).

use async_trait::async_trait;
use docpipe_types::OcrPage;
use docpipe_utils::Result;

/// A page rendered to an image, ready for OCR.
pub struct PageImage {
    pub page_number: u32,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Recognize text on a single rendered page.
    async fn recognize(&self, page: &PageImage) -> Result<OcrPage>;

    fn name(&self) -> &'static str;
}
