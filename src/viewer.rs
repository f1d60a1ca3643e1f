//! Page navigation state for the document shown after signing.

use serde::Serialize;

use crate::compositor;
use crate::error::SignError;

/// Tracks which page of the loaded document is on screen.
///
/// Page indices are 1-based and always within `[1, total_pages]`. With no
/// document loaded both are 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedViewer {
    total_pages: u32,
    current_page: u32,
}

impl PagedViewer {
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Loads a new document and goes back to its first page.
    ///
    /// Parsing runs on the blocking pool. Returns the total page count.
    pub async fn load_document(&mut self, bytes: std::sync::Arc<[u8]>) -> Result<u32, SignError> {
        let count = tokio::task::spawn_blocking(move || compositor::page_count(&bytes))
            .await
            .map_err(|e| SignError::MalformedDocument(format!("page count task failed: {e}")))??;
        self.set_document_pages(count);
        Ok(count)
    }

    /// Same as [`load_document`](Self::load_document) once the count is known.
    pub fn set_document_pages(&mut self, count: u32) {
        self.total_pages = count;
        self.current_page = count.min(1);
    }

    pub fn render_page(&mut self, page: u32) -> u32 {
        if self.total_pages > 0 {
            self.current_page = page.clamp(1, self.total_pages);
        }
        self.current_page
    }

    pub fn next_page(&mut self) -> u32 {
        self.render_page(self.current_page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> u32 {
        self.render_page(self.current_page.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_pdf;

    #[test]
    fn navigation_is_clamped() {
        let mut v = PagedViewer::default();
        v.set_document_pages(3);
        assert_eq!(v.prev_page(), 1);
        assert_eq!(v.render_page(0), 1);
        assert_eq!(v.next_page(), 2);
        assert_eq!(v.next_page(), 3);
        assert_eq!(v.next_page(), 3);
        assert_eq!(v.render_page(99), 3);
    }

    #[test]
    fn nothing_loaded_has_no_pages() {
        let mut v = PagedViewer::default();
        assert_eq!((v.total_pages(), v.current_page()), (0, 0));
        assert_eq!(v.render_page(3), 0);
        assert_eq!(v.next_page(), 0);
        assert_eq!(v.prev_page(), 0);

        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json, serde_json::json!({ "totalPages": 0, "currentPage": 0 }));
    }

    #[tokio::test]
    async fn load_document_counts_pages() {
        let mut v = PagedViewer::default();
        v.render_page(5);
        let pdf = build_pdf(&[(612.0, 792.0), (612.0, 792.0)]);
        assert_eq!(v.load_document(pdf.into()).await.unwrap(), 2);
        assert_eq!(v.current_page(), 1);
        assert_eq!(v.total_pages(), 2);
    }

    #[tokio::test]
    async fn load_document_rejects_garbage() {
        let mut v = PagedViewer::default();
        let err = v.load_document(b"hello".to_vec().into()).await.unwrap_err();
        assert!(matches!(err, SignError::MalformedDocument(_)));
    }
}
