//! Batch pipeline: extract embedded images from a DOCX/PPTX, synthesize
//! alt-text via a vision-capable model, and write the descriptions back
//! into a byte-minimal copy of the source document.
//!
//! The crate is organized as one module per pipeline stage (§2 dataflow):
//! [`extractor`] walks the document, [`context`] gathers the five context
//! tiers, [`generator`] calls the vision model with retry and validation,
//! [`assembler`] writes results back. [`model`] holds the shared data
//! types and [`config`] the immutable run configuration. Top-level
//! functions here wire these stages together; nothing below the CLI reads
//! `std::env` except [`vision::azure_openai::AzureOpenAiVisionClient::
//! from_env`].

pub mod assembler;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod model;
pub mod vision;

use std::io::Cursor;
use std::sync::Arc;

use zip::ZipArchive;

use config::PipelineConfig;
use context::DocumentIndex;
use error::Error;
use extractor::DocumentFormat;
use generator::{Generator, VisionClient};
use model::{AltTextResult, ProcessingRecord};

/// Used only to populate `ProcessingRecord::estimated_cost_usd`; callers
/// with a different pricing model can ignore the field and recompute from
/// `tokens_used_total` themselves.
pub const USD_PER_1000_TOKENS: f64 = 0.01;

/// Reject an input whose size exceeds the configured cap (§6 configuration
/// table, `max_file_size_mb`). Fatal; callers surface this as exit code 2.
pub fn check_size(data: &[u8], limits: &config::ExtractionLimits) -> Result<(), Error> {
    let max_bytes = limits.max_file_size_mb * 1024 * 1024;
    if data.len() as u64 > max_bytes {
        return Err(Error::Input(format!(
            "input is {} bytes, exceeds max_file_size_mb cap of {}",
            data.len(),
            limits.max_file_size_mb
        )));
    }
    Ok(())
}

/// Strip a leading UTF-8 BOM from external `.txt`/`.md` context (§6: "no
/// BOM required, BOM stripped if present").
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Read `docProps/core.xml` for the document-tier metadata. Absent or
/// unparseable metadata degrades to the filename fallback in
/// [`context::DocumentMetadata::format_tier`], not an error.
pub fn read_document_metadata(data: &[u8]) -> context::DocumentMetadata {
    let Ok(mut archive) = ZipArchive::new(Cursor::new(data)) else {
        return context::DocumentMetadata::default();
    };
    match extractor::ooxml::read_entry_string(&mut archive, "docProps/core.xml") {
        Ok(xml) => context::parse_core_properties(&xml),
        Err(_) => context::DocumentMetadata::default(),
    }
}

/// Parse the document once into a [`DocumentIndex`] for reuse across every
/// image's context build, avoiding a re-parse of `word/document.xml` (or
/// every slide) per image.
pub fn build_document_index(data: &[u8], format: DocumentFormat) -> Result<DocumentIndex, Error> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::Processing(format!("not a valid {} archive: {e}", format.as_str())))?;

    match format {
        DocumentFormat::Docx => {
            let document_xml = extractor::ooxml::read_entry_string(&mut archive, "word/document.xml")
                .map_err(|_| Error::Processing("word/document.xml missing".to_string()))?;
            Ok(context::index_docx(&document_xml))
        }
        DocumentFormat::Pptx => {
            let presentation_xml =
                extractor::ooxml::read_entry_string(&mut archive, "ppt/presentation.xml")
                    .map_err(|_| Error::Processing("ppt/presentation.xml missing".to_string()))?;
            let presentation_rels =
                extractor::ooxml::read_entry_string(&mut archive, "ppt/_rels/presentation.xml.rels")
                    .unwrap_or_default();
            let relationships = extractor::ooxml::parse_relationships(&presentation_rels);
            let slide_rids = extractor::pptx::slide_relationship_ids(&presentation_xml);

            let slide_xml = slide_rids
                .iter()
                .map(|rid| {
                    relationships
                        .get(rid)
                        .map(|target| extractor::ooxml::resolve_target("ppt", target))
                        .and_then(|path| extractor::ooxml::read_entry_string(&mut archive, &path).ok())
                        .unwrap_or_default()
                })
                .collect();
            Ok(context::index_pptx(slide_xml))
        }
    }
}

/// Run extractor → context builder → generator over one document,
/// returning the processing record (`extract` subcommand). `external_text`
/// is the already BOM-stripped contents of an optional `.txt`/`.md`
/// context file, loaded once by the caller.
pub async fn extract_alt_text(
    data: &[u8],
    format: DocumentFormat,
    file_name: &str,
    input_path: &str,
    config: &PipelineConfig,
    external_text: Option<&str>,
    client: Arc<dyn VisionClient>,
) -> Result<ProcessingRecord, Error> {
    check_size(data, &config.extraction)?;

    let images = extractor::for_format(format).extract(data, &config.extraction)?;
    let index = build_document_index(data, format)?;
    let metadata = read_document_metadata(data);

    let contexts: Vec<String> = images
        .iter()
        .map(|image| {
            context::build(&index, image, &metadata, external_text, file_name, &config.context)
                .merge(config.context.max_context_chars)
        })
        .collect();

    let generator = Generator::new(client, config.clone());
    let (results, failures) = generator.generate_for_multiple_images(&images, &contexts).await?;

    let mut record =
        ProcessingRecord::new(input_path.to_string(), input_path.to_string(), format.as_str().to_string());
    for result in results {
        record.record_success(result);
    }
    for failure in failures {
        record.record_failure(failure);
    }
    record.estimated_cost_usd = (record.tokens_used_total as f64 / 1000.0) * USD_PER_1000_TOKENS;

    Ok(record)
}

/// Write a prior `extract` run's results back into a copy of the source
/// document (`apply` subcommand). Per-image failures are recorded in the
/// returned status map, not propagated; only open/parse failure on `data`
/// itself is fatal.
pub fn apply_alt_text(
    data: &[u8],
    format: DocumentFormat,
    results: &[AltTextResult],
) -> Result<assembler::AssembledDocument, Error> {
    assembler::for_format(format).apply(data, results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_size_rejects_input_over_cap() {
        let limits = config::ExtractionLimits { max_images_per_document: 100, max_file_size_mb: 0 };
        let err = check_size(b"not actually tiny", &limits).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn check_size_accepts_input_under_cap() {
        let limits = config::ExtractionLimits::default();
        assert!(check_size(b"small", &limits).is_ok());
    }

    #[test]
    fn strip_bom_removes_leading_marker_only() {
        assert_eq!(strip_bom("\u{feff}hello"), "hello");
        assert_eq!(strip_bom("hello"), "hello");
    }

    #[test]
    fn read_document_metadata_degrades_to_default_for_non_zip_input() {
        let metadata = read_document_metadata(b"not a zip file");
        assert_eq!(metadata.title, None);
        assert_eq!(metadata.subject, None);
        assert_eq!(metadata.author, None);
    }
}
