//! Turning a document's raw bytes into the `PageImage`s the OCR stage
//! consumes. Spec §1 excludes "preview-image rendering" from scope, and
//! real rasterization (PDF pages to bitmaps at a given DPI) needs a
//! library absent from this corpus; this module defines the narrow
//! seam instead, the same way `storage`/`docpipe_llm::LlmBackend` stand
//! in for the object-store client and the LLM endpoint.
//!
//! `IdentityPageRenderer` is the in-tree stand-in: it does not
//! rasterize anything. For an already-rasterized single image upload
//! it is correct as-is; for a multi-page PDF it hands every page the
//! same raw bytes, which is sufficient for wiring and tests but not a
//! substitute for a real rasterizer in production.

use async_trait::async_trait;
use docpipe_ocr::PageImage;
use docpipe_utils::Result;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_pages(&self, bytes: &[u8], mime_type: &'static str, page_count: u32) -> Result<Vec<PageImage>>;
}

pub struct IdentityPageRenderer;

#[async_trait]
impl PageRenderer for IdentityPageRenderer {
    async fn render_pages(&self, bytes: &[u8], mime_type: &'static str, page_count: u32) -> Result<Vec<PageImage>> {
        Ok((1..=page_count.max(1))
            .map(|page_number| PageImage {
                page_number,
                bytes: bytes.to_vec(),
                mime_type,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_one_page_image_per_declared_page() {
        let renderer = IdentityPageRenderer;
        let pages = renderer.render_pages(b"%PDF-1.4", "application/pdf", 3).await.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[2].page_number, 3);
    }

    #[tokio::test]
    async fn at_least_one_page_even_if_page_count_is_zero() {
        let renderer = IdentityPageRenderer;
        let pages = renderer.render_pages(b"x", "image/png", 0).await.unwrap();
        assert_eq!(pages.len(), 1);
    }
}
