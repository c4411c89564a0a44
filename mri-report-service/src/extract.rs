use lopdf::Document;
use tracing::{debug, info};

use crate::error::ReportError;

/// Pulls plain text out of an uploaded PDF.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8]) -> Result<String, ReportError>;
}

/// Text layer extraction with lopdf; scanned pages yield nothing.
///
/// Page texts are concatenated as extracted. Only pages that produce no text at
/// all are skipped, so whitespace between pages is preserved.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, pdf: &[u8]) -> Result<String, ReportError> {
        let doc = Document::load_mem(pdf)
            .map_err(|e| ReportError::Input(format!("Unable to read PDF: {}", e)))?;

        let pages = doc.get_pages();
        let mut text = String::new();
        let mut pages_with_text = 0;

        // BTreeMap keys keep page order
        for page_number in pages.keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(page_text) if !page_text.is_empty() => {
                    text.push_str(&page_text);
                    pages_with_text += 1;
                }
                Ok(_) => debug!(page = page_number, "page has no text layer"),
                Err(e) => debug!(page = page_number, error = %e, "skipping unreadable page"),
            }
        }

        info!(
            pages = pages.len(),
            pages_with_text,
            characters = text.len(),
            "extracted text from PDF"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::text_pdf;

    #[test]
    fn test_extracts_text_in_page_order() {
        let pdf = text_pdf(&["MRI LUMBAR SPINE", "Impression mild bulge"]);

        let text = LopdfExtractor.extract(&pdf).unwrap();

        let first = text.find("MRI LUMBAR SPINE").unwrap();
        let second = text.find("Impression mild bulge").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_pages_without_text_are_skipped() {
        let pdf = text_pdf(&["", "Findings on page two", ""]);

        let text = LopdfExtractor.extract(&pdf).unwrap();

        assert!(text.contains("Findings on page two"));
        assert_eq!(text.matches("Findings on page two").count(), 1);
    }

    #[test]
    fn test_whitespace_only_page_is_kept() {
        let pdf = text_pdf(&["   "]);

        let text = LopdfExtractor.extract(&pdf).unwrap();

        assert!(!text.is_empty());
        assert!(text.trim().is_empty());
    }

    #[test]
    fn test_blank_document_yields_blank_text() {
        let pdf = text_pdf(&["", ""]);

        let text = LopdfExtractor.extract(&pdf).unwrap();

        assert!(text.trim().is_empty());
    }

    #[test]
    fn test_garbage_bytes_are_input_error() {
        let err = LopdfExtractor.extract(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ReportError::Input(_)));
    }
}
