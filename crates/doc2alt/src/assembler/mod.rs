//! Assembler: writes generated alt text back into a byte-minimal copy of
//! the source document (§4.4). Every ZIP entry except the one XML part
//! touched by an edit is copied with `raw_copy_file`, so compression and
//! byte layout of everything else in the archive is untouched — the only
//! bytes that change are the `title`/`descr` (and, for PPTX, `name`)
//! attributes named by the byte-minimal-modification invariant.

pub mod docx;
pub mod pptx;

use std::collections::HashMap;

use crate::error::Error;
use crate::extractor::DocumentFormat;
use crate::model::AltTextResult;

/// `locator → "success" | "failed: <reason>"`.
pub type StatusMap = HashMap<String, String>;

/// The rewritten document bytes plus a per-image outcome, mirroring
/// `apply(results) → status map`.
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub status: StatusMap,
}

pub trait Assembler {
    fn format(&self) -> DocumentFormat;

    /// Apply every result to a copy of `data`, returning the new document
    /// bytes and a status entry for each result. Open/parse failures on
    /// `data` itself are fatal; a per-image locator that cannot be found is
    /// recorded in the status map, not returned as an error.
    fn apply(&self, data: &[u8], results: &[AltTextResult]) -> Result<AssembledDocument, Error>;
}

/// Build the assembler for a given format.
pub fn for_format(format: DocumentFormat) -> Box<dyn Assembler> {
    match format {
        DocumentFormat::Docx => Box::new(docx::DocxAssembler),
        DocumentFormat::Pptx => Box::new(pptx::PptxAssembler),
    }
}
