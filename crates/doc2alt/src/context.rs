//! Context builder: gathers the five context tiers for one image and
//! merges them under a character budget (§4.2).

use crate::config::ContextConfig;
use crate::extractor::docx::paragraph_texts;
use crate::extractor::pptx::non_picture_shape_text;
use crate::model::{ContextBundle, FormatPosition, ImageRecord};

/// Document-level metadata read once per run from `docProps/core.xml`.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub author: Option<String>,
}

impl DocumentMetadata {
    /// `"title='…' subject='…' author='…'"`, skipping empty fields, or the
    /// filename fallback if every field is empty.
    pub fn format_tier(&self, file_name: &str, format_label: &str) -> String {
        let mut parts = Vec::new();
        if let Some(title) = self.title.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("title='{title}'"));
        }
        if let Some(subject) = self.subject.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("subject='{subject}'"));
        }
        if let Some(author) = self.author.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("author='{author}'"));
        }
        if parts.is_empty() {
            format!("{format_label} document ({file_name})")
        } else {
            parts.join(" ")
        }
    }
}

/// Everything the context builder needs about the source document besides
/// the image itself, parsed once per run and passed by reference to every
/// per-image `build` call — never re-parsed from the ZIP per image.
pub enum DocumentIndex {
    Docx {
        paragraphs: Vec<crate::extractor::docx::ParagraphInfo>,
    },
    Pptx {
        /// Raw slide XML by slide index, kept only long enough to answer
        /// `non_picture_shape_text` queries for the local tier.
        slide_xml: Vec<String>,
    },
}

/// `build(document_index, image_record, metadata, external_text, file_name,
/// config) → Context Bundle`. `external_text` is loaded once per document
/// run by the caller (§4.2 external tier).
pub fn build(
    index: &DocumentIndex,
    image: &ImageRecord,
    metadata: &DocumentMetadata,
    external_text: Option<&str>,
    file_name: &str,
    config: &ContextConfig,
) -> ContextBundle {
    let mut bundle = ContextBundle::default();

    bundle.external = external_text
        .map(|text| crate::model::truncate_utf8(text, config.max_external_chars))
        .filter(|s| !s.is_empty());

    let format_label = match index {
        DocumentIndex::Docx { .. } => "DOCX",
        DocumentIndex::Pptx { .. } => "PPTX",
    };
    bundle.document = Some(metadata.format_tier(file_name, format_label));

    match (&image.format_position, index) {
        (
            FormatPosition::Docx { paragraph_index, .. },
            DocumentIndex::Docx { paragraphs },
        ) => {
            bundle.section = section_tier_docx(paragraphs, *paragraph_index);
            bundle.page = None;
            bundle.local = local_tier_docx(
                paragraphs,
                *paragraph_index,
                config.paragraphs_before as usize,
                config.paragraphs_after as usize,
            );
        }
        (FormatPosition::Pptx { slide_index, .. }, DocumentIndex::Pptx { slide_xml }) => {
            bundle.section = image.host_hint.clone();
            bundle.page = image.host_hint.clone();
            bundle.local = slide_xml
                .get(*slide_index)
                .map(|xml| non_picture_shape_text(xml))
                .filter(|s| !s.is_empty())
                .or_else(|| Some(format!("Slide {} of presentation", slide_index + 1)));
        }
        _ => {}
    }

    bundle
}

fn section_tier_docx(
    paragraphs: &[crate::extractor::docx::ParagraphInfo],
    paragraph_index: usize,
) -> Option<String> {
    (0..=paragraph_index).rev().find_map(|i| {
        paragraphs.get(i).and_then(|p| {
            p.style_name
                .as_deref()
                .filter(|style| is_heading_style(style))
                .map(|_| p.text.clone())
        })
    })
}

fn is_heading_style(style: &str) -> bool {
    style
        .strip_prefix("Heading")
        .map(|rest| {
            let rest = rest.trim();
            matches!(rest, "1" | "2" | "3" | "4" | "5" | "6")
        })
        .unwrap_or(false)
}

fn local_tier_docx(
    paragraphs: &[crate::extractor::docx::ParagraphInfo],
    paragraph_index: usize,
    before: usize,
    after: usize,
) -> Option<String> {
    let mut collected = Vec::new();

    let start = paragraph_index.saturating_sub(before);
    for p in &paragraphs[start..paragraph_index] {
        if !p.text.trim().is_empty() {
            collected.push(p.text.trim().to_string());
        }
    }

    let end = (paragraph_index + 1 + after).min(paragraphs.len());
    if paragraph_index + 1 < end {
        for p in &paragraphs[paragraph_index + 1..end] {
            if !p.text.trim().is_empty() {
                collected.push(p.text.trim().to_string());
            }
        }
    }

    (!collected.is_empty()).then(|| collected.join(" "))
}

/// Parse `docProps/core.xml`, read once per document.
pub fn parse_core_properties(xml: &str) -> DocumentMetadata {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut metadata = DocumentMetadata::default();

    #[derive(PartialEq)]
    enum Field {
        None,
        Title,
        Subject,
        Creator,
    }
    let mut current = Field::None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current = match e.local_name().as_ref() {
                    b"title" => Field::Title,
                    b"subject" => Field::Subject,
                    b"creator" => Field::Creator,
                    _ => Field::None,
                };
            }
            Ok(Event::Text(e)) if current != Field::None => {
                if let Ok(text) = e.unescape() {
                    let text = text.into_owned();
                    match current {
                        Field::Title => metadata.title = Some(text),
                        Field::Subject => metadata.subject = Some(text),
                        Field::Creator => metadata.author = Some(text),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(_)) => current = Field::None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    metadata
}

/// Build a [`DocumentIndex`] for a DOCX document from its `word/
/// document.xml` content, for reuse by [`build`].
pub fn index_docx(document_xml: &str) -> DocumentIndex {
    DocumentIndex::Docx {
        paragraphs: paragraph_texts(document_xml),
    }
}

/// Build a [`DocumentIndex`] for a PPTX document from its slides' XML, in
/// slide order.
pub fn index_pptx(slide_xml: Vec<String>) -> DocumentIndex {
    DocumentIndex::Pptx { slide_xml }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::docx::ParagraphInfo;
    use crate::model::{AnchorType, ImageFormat, Locator};

    fn docx_record(paragraph_index: usize) -> ImageRecord {
        ImageRecord {
            locator: Locator::docx(paragraph_index, 0),
            bytes: vec![1, 2, 3],
            format: ImageFormat::Png,
            pixel_width: 10,
            pixel_height: 10,
            format_position: FormatPosition::Docx {
                paragraph_index,
                anchor_type: AnchorType::Inline,
            },
            existing_alt_text: None,
            host_hint: None,
        }
    }

    #[test]
    fn document_tier_falls_back_to_filename_when_metadata_empty() {
        let metadata = DocumentMetadata::default();
        assert_eq!(metadata.format_tier("report.docx", "DOCX"), "DOCX document (report.docx)");
    }

    #[test]
    fn document_tier_formats_present_fields_only() {
        let metadata = DocumentMetadata {
            title: Some("Q3 Report".into()),
            subject: None,
            author: Some("Jane".into()),
        };
        assert_eq!(metadata.format_tier("r.docx", "DOCX"), "title='Q3 Report' author='Jane'");
    }

    #[test]
    fn section_tier_finds_nearest_preceding_heading() {
        let paragraphs = vec![
            ParagraphInfo { style_name: Some("Heading1".into()), text: "Intro".into() },
            ParagraphInfo { style_name: None, text: "Some body text".into() },
            ParagraphInfo { style_name: None, text: "More body text".into() },
        ];
        assert_eq!(section_tier_docx(&paragraphs, 2).as_deref(), Some("Intro"));
    }

    #[test]
    fn section_tier_absent_when_no_heading_found() {
        let paragraphs = vec![ParagraphInfo { style_name: None, text: "Body".into() }];
        assert_eq!(section_tier_docx(&paragraphs, 0), None);
    }

    #[test]
    fn local_tier_skips_empty_paragraphs_and_the_images_own_paragraph() {
        let paragraphs = vec![
            ParagraphInfo { style_name: None, text: "Before 1".into() },
            ParagraphInfo { style_name: None, text: "".into() },
            ParagraphInfo { style_name: None, text: "".into() }, // image's own paragraph
            ParagraphInfo { style_name: None, text: "After 1".into() },
        ];
        let local = local_tier_docx(&paragraphs, 2, 2, 2);
        assert_eq!(local.as_deref(), Some("Before 1 After 1"));
    }

    #[test]
    fn build_merges_tiers_for_docx_with_separator_and_labels() {
        let paragraphs = vec![
            ParagraphInfo { style_name: Some("Heading1".into()), text: "Revenue".into() },
            ParagraphInfo { style_name: None, text: "".into() },
        ];
        let index = DocumentIndex::Docx { paragraphs };
        let metadata = DocumentMetadata { title: Some("Q3".into()), ..Default::default() };
        let bundle = build(&index, &docx_record(1), &metadata, None, "r.docx", &ContextConfig::default());
        let merged = bundle.merge(12_000);
        assert!(merged.contains("[Document: title='Q3']"));
        assert!(merged.contains("[Section: Revenue]"));
    }
}
