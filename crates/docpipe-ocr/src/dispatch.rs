//! Page selection (via the page-expression grammar) and bounded-
//! parallelism dispatch across a primary backend with an optional
//! fallback invoked page-by-page when the primary comes back empty.

use crate::backend::{OcrBackend, PageImage};
use docpipe_types::job::OcrPage;
use docpipe_types::{page_expr, OcrStructured};
use docpipe_utils::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Filter `pages` down to the ones selected by `expr` (spec's
/// `specified_pages` grammar) against the full page count. `None`
/// selects every page, matching the `single_page`/`multi_page`
/// strategies that never narrow the page set.
#[must_use]
pub fn select_pages(expr: Option<&str>, pages: Vec<PageImage>, page_count: u32) -> Vec<PageImage> {
    let Some(expr) = expr else { return pages };
    let terms = page_expr::parse(expr);
    let selected = page_expr::resolve_pages(&terms, page_count);
    pages
        .into_iter()
        .filter(|p| selected.contains(&p.page_number))
        .collect()
}

/// Recognize every page in `pages` concurrently, bounded by
/// `parallelism` in-flight calls, using `primary` and falling back to
/// `fallback` (if configured) for any page whose primary result comes
/// back with empty text.
pub async fn recognize_pages(
    pages: Vec<PageImage>,
    primary: Arc<dyn OcrBackend>,
    fallback: Option<Arc<dyn OcrBackend>>,
    parallelism: usize,
) -> Result<OcrStructured> {
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut tasks = Vec::with_capacity(pages.len());

    for page in pages {
        let semaphore = semaphore.clone();
        let primary = primary.clone();
        let fallback = fallback.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            recognize_one(&page, primary.as_ref(), fallback.as_deref()).await
        }));
    }

    let mut results: Vec<OcrPage> = Vec::with_capacity(tasks.len());
    for task in tasks {
        let page = task
            .await
            .map_err(|e| docpipe_utils::DocpipeError::Ocr(format!("OCR task panicked: {e}")))??;
        results.push(page);
    }
    results.sort_by_key(|p| p.page_number);

    Ok(OcrStructured { pages: results })
}

async fn recognize_one(
    page: &PageImage,
    primary: &dyn OcrBackend,
    fallback: Option<&dyn OcrBackend>,
) -> Result<OcrPage> {
    let result = primary.recognize(page).await?;
    if !result.text.trim().is_empty() {
        return Ok(result);
    }
    let Some(fallback) = fallback else {
        return Ok(result);
    };
    warn!(
        page = page.page_number,
        backend = primary.name(),
        "primary OCR backend returned empty text, retrying with fallback"
    );
    fallback.recognize(page).await
}
