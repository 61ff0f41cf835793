//! DOCX image extraction (§4.1 DOCX algorithm).

use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use super::ooxml;
use super::{DocumentFormat, Extractor};
use crate::config::ExtractionLimits;
use crate::error::Error;
use crate::model::{AnchorType, FormatPosition, ImageRecord, Locator};

pub struct DocxExtractor;

/// One paragraph's style name and plain text, used both here (to locate
/// images by paragraph index) and by the context builder (section/local
/// tiers) so the XML walk of `word/document.xml` is not duplicated.
#[derive(Debug, Clone, Default)]
pub struct ParagraphInfo {
    pub style_name: Option<String>,
    pub text: String,
}

impl Extractor for DocxExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn extract(&self, data: &[u8], limits: &ExtractionLimits) -> Result<Vec<ImageRecord>, Error> {
        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| Error::Processing(format!("not a valid DOCX archive: {e}")))?;

        let document_xml = ooxml::read_entry_string(&mut archive, "word/document.xml")
            .map_err(|_| Error::Processing("word/document.xml missing".to_string()))?;

        let rels_xml = ooxml::read_entry_string(&mut archive, "word/_rels/document.xml.rels")
            .unwrap_or_default();
        let relationships = ooxml::parse_relationships(&rels_xml);

        let mut records = Vec::new();
        for blip in find_blips(&document_xml) {
            if records.len() >= limits.max_images_per_document {
                tracing::warn!(
                    paragraph_index = blip.paragraph_index,
                    "max_images_per_document reached, skipping remaining images"
                );
                break;
            }

            let Some(target) = relationships.get(&blip.relationship_id) else {
                tracing::warn!(rid = %blip.relationship_id, "unresolved image relationship, skipping");
                continue;
            };
            let media_path = ooxml::resolve_target("word", target);

            let bytes = match ooxml::read_entry_bytes(&mut archive, &media_path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %media_path, error = %e, "failed to read image bytes, skipping");
                    continue;
                }
            };

            let Some((format, pixel_width, pixel_height)) = ooxml::decode_image_metadata(&bytes)
            else {
                tracing::warn!(path = %media_path, "failed to decode image dimensions, skipping");
                continue;
            };

            let locator = Locator::docx(blip.paragraph_index, blip.within_paragraph_index);
            records.push(ImageRecord {
                locator,
                bytes,
                format,
                pixel_width,
                pixel_height,
                format_position: FormatPosition::Docx {
                    paragraph_index: blip.paragraph_index,
                    anchor_type: blip.anchor_type,
                },
                existing_alt_text: blip.existing_alt_text,
                host_hint: None,
            });
        }

        Ok(records)
    }
}

struct BlipRef {
    paragraph_index: usize,
    within_paragraph_index: usize,
    relationship_id: String,
    anchor_type: AnchorType,
    existing_alt_text: Option<String>,
}

/// Walk `word/document.xml` paragraph by paragraph, finding every `a:blip`
/// element (inline or floating) and the `docPr` alt-text that precedes it
/// in document order. `current_alt` is reset at the start of every
/// paragraph and every `wp:inline`/`wp:anchor` subtree so a non-picture
/// drawing's `docPr` (a chart or SmartArt with no `a:blip`) never leaks
/// its text onto a later picture.
fn find_blips(document_xml: &str) -> Vec<BlipRef> {
    let mut reader = Reader::from_str(document_xml);
    let mut blips = Vec::new();

    let mut paragraph_index: i64 = -1;
    let mut within_paragraph_index = 0usize;
    let mut current_anchor: Option<AnchorType> = None;
    let mut current_alt: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"p" if e.name().as_ref().starts_with(b"w:") => {
                        paragraph_index += 1;
                        within_paragraph_index = 0;
                        current_alt = None;
                    }
                    b"inline" => {
                        current_anchor = Some(AnchorType::Inline);
                        current_alt = None;
                    }
                    b"anchor" => {
                        current_anchor = Some(AnchorType::Floating);
                        current_alt = None;
                    }
                    b"docPr" => {
                        current_alt = first_non_empty_attr(e, &["title", "descr"]);
                    }
                    b"blip" => {
                        if let Some(rid) = attr_value(e, "embed") {
                            if paragraph_index >= 0 {
                                blips.push(BlipRef {
                                    paragraph_index: paragraph_index as usize,
                                    within_paragraph_index,
                                    relationship_id: rid,
                                    anchor_type: current_anchor.unwrap_or(AnchorType::Inline),
                                    existing_alt_text: current_alt.take(),
                                });
                                within_paragraph_index += 1;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    blips
}

/// Collect plain text and style name per paragraph, in document order, for
/// use by the context builder's section and local tiers.
pub fn paragraph_texts(document_xml: &str) -> Vec<ParagraphInfo> {
    let mut reader = Reader::from_str(document_xml);
    let mut paragraphs = Vec::new();
    let mut current = ParagraphInfo::default();
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    current = ParagraphInfo::default();
                }
                b"pStyle" if in_paragraph => {
                    current.style_name = attr_value(e, "val");
                }
                b"t" if in_paragraph => in_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if in_paragraph => {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    paragraphs
}

fn attr_value(e: &quick_xml::events::BytesStart, local_name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local_name.as_bytes() {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn first_non_empty_attr(e: &quick_xml::events::BytesStart, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| attr_value(e, name).filter(|v| !v.is_empty()))
}
