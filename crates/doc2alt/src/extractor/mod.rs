//! Extractor: walks a DOCX or PPTX document tree and yields every embedded
//! raster image as an [`ImageRecord`], in document reading order.

pub mod docx;
pub(crate) mod ooxml;
pub mod pptx;

use crate::config::ExtractionLimits;
use crate::error::Error;
use crate::model::ImageRecord;

/// Which of the two supported container formats a document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Docx,
    Pptx,
}

impl DocumentFormat {
    /// Detect format from a file extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pptx => "pptx",
        }
    }
}

/// Two methods, no deep inheritance: dispatch happens once at the top of
/// a run based on the file extension, per the cross-format-polymorphism
/// design.
pub trait Extractor {
    fn format(&self) -> DocumentFormat;
    fn extract(&self, data: &[u8], limits: &ExtractionLimits) -> Result<Vec<ImageRecord>, Error>;
}

/// Build the extractor for a given format.
pub fn for_format(format: DocumentFormat) -> Box<dyn Extractor> {
    match format {
        DocumentFormat::Docx => Box::new(docx::DocxExtractor),
        DocumentFormat::Pptx => Box::new(pptx::PptxExtractor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("pptx"), Some(DocumentFormat::Pptx));
        assert_eq!(DocumentFormat::from_extension("pdf"), None);
    }
}
