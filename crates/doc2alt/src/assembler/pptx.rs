//! PPTX alt-text assembly (§4.4 PPTX algorithm).

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use zip::ZipArchive;

use super::docx::{set_attrs, write_with_replacement};
use super::{AssembledDocument, Assembler, StatusMap};
use crate::error::Error;
use crate::extractor::ooxml;
use crate::extractor::pptx::slide_relationship_ids;
use crate::extractor::DocumentFormat;
use crate::model::AltTextResult;

pub struct PptxAssembler;

impl Assembler for PptxAssembler {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pptx
    }

    fn apply(&self, data: &[u8], results: &[AltTextResult]) -> Result<AssembledDocument, Error> {
        let mut status: StatusMap = HashMap::new();
        let mut edits_by_slide: HashMap<usize, HashMap<usize, String>> = HashMap::new();
        for result in results {
            match result.locator.parse_pptx() {
                Some((slide_index, shape_index)) => {
                    edits_by_slide
                        .entry(slide_index)
                        .or_default()
                        .insert(shape_index, result.text.clone());
                }
                None => {
                    status.insert(
                        result.locator.as_str().to_string(),
                        "failed: locator is not a PPTX locator".to_string(),
                    );
                }
            }
        }

        let mut current_bytes = data.to_vec();
        let mut applied: HashMap<(usize, usize), bool> = HashMap::new();

        // Each slide is rewritten independently: reopen the archive (now
        // reflecting any earlier slides' edits) per slide touched.
        for (slide_index, shape_edits) in edits_by_slide.iter() {
            let mut archive = ZipArchive::new(Cursor::new(&current_bytes))
                .map_err(|e| Error::Processing(format!("not a valid PPTX archive: {e}")))?;

            let presentation_xml = ooxml::read_entry_string(&mut archive, "ppt/presentation.xml")
                .map_err(|_| Error::Processing("ppt/presentation.xml missing".to_string()))?;
            let presentation_rels =
                ooxml::read_entry_string(&mut archive, "ppt/_rels/presentation.xml.rels")
                    .unwrap_or_default();
            let presentation_relationships = ooxml::parse_relationships(&presentation_rels);
            let slide_rids = slide_relationship_ids(&presentation_xml);

            let Some(rid) = slide_rids.get(*slide_index) else { continue };
            let Some(target) = presentation_relationships.get(rid) else { continue };
            let slide_path = ooxml::resolve_target("ppt", target);

            let slide_xml = match ooxml::read_entry_string(&mut archive, &slide_path) {
                Ok(xml) => xml,
                Err(_) => continue,
            };

            let (rewritten, found) = rewrite_slide_xml(&slide_xml, shape_edits);
            for shape_index in found {
                applied.insert((*slide_index, shape_index), true);
            }

            current_bytes = write_with_replacement(&mut archive, &slide_path, rewritten.as_bytes())?;
        }

        for result in results {
            if let Some(key) = result.locator.parse_pptx() {
                let verdict = if applied.contains_key(&key) {
                    "success".to_string()
                } else {
                    "failed: image not found at locator".to_string()
                };
                status.insert(result.locator.as_str().to_string(), verdict);
            }
        }

        Ok(AssembledDocument { bytes: current_bytes, status })
    }
}

/// Rewrite every picture shape named in `shape_edits`: set the shape's
/// `name`, plus `title` and `descr`, all to the same text. Returns the new
/// slide XML and the set of shape indices actually found.
fn rewrite_slide_xml(
    slide_xml: &str,
    shape_edits: &HashMap<usize, String>,
) -> (String, Vec<usize>) {
    let mut reader = Reader::from_str(slide_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut picture_ordinal: i64 = -1;
    let mut current_text: Option<String> = None;
    let mut depth_in_pic: i32 = 0;
    let mut found = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"pic" && e.name().as_ref().starts_with(b"p:") {
                    depth_in_pic += 1;
                    picture_ordinal += 1;
                    current_text = shape_edits.get(&(picture_ordinal as usize)).cloned();
                    if current_text.is_some() {
                        found.push(picture_ordinal as usize);
                    }
                }
                let _ = writer.write_event(Event::Start(e));
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"pic" && e.name().as_ref().starts_with(b"p:") && depth_in_pic > 0 {
                    depth_in_pic -= 1;
                    current_text = None;
                }
                let _ = writer.write_event(Event::End(e));
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"cNvPr" && depth_in_pic > 0 {
                    if let Some(text) = &current_text {
                        let rewritten =
                            set_attrs(&e, &[("name", text), ("title", text), ("descr", text)]);
                        let _ = writer.write_event(Event::Empty(rewritten));
                        continue;
                    }
                }
                let _ = writer.write_event(Event::Empty(e));
            }
            Ok(event) => {
                let _ = writer.write_event(event);
            }
            Err(_) => break,
        }
    }

    let bytes = writer.into_inner().into_inner();
    (String::from_utf8(bytes).unwrap_or_default(), found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Locator;
    use chrono::Utc;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const SLIDE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><p:cSld><p:spTree><p:pic><p:nvPicPr><p:cNvPr id="10" name="Picture 1"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rIdImg1"/></p:blipFill></p:pic></p:spTree></p:cSld></p:sld>"#;

    fn sample_result(locator: Locator, text: &str) -> AltTextResult {
        AltTextResult {
            locator,
            text: text.to_string(),
            validation_passed: true,
            warnings: vec![],
            confidence: 0.9,
            tokens_used: 10,
            duration_seconds: 0.1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn rewrite_sets_name_title_and_descr_for_targeted_shape() {
        let mut edits = HashMap::new();
        edits.insert(0usize, "A quarterly revenue chart.".to_string());
        let (rewritten, found) = rewrite_slide_xml(SLIDE_XML, &edits);
        assert_eq!(found, vec![0]);
        assert!(rewritten.contains(r#"name="A quarterly revenue chart.""#));
        assert!(rewritten.contains(r#"title="A quarterly revenue chart.""#));
        assert!(rewritten.contains(r#"descr="A quarterly revenue chart.""#));
        assert!(rewritten.contains(r#"id="10""#));
    }

    #[test]
    fn rewrite_leaves_untargeted_shapes_unchanged() {
        let (rewritten, found) = rewrite_slide_xml(SLIDE_XML, &HashMap::new());
        assert!(found.is_empty());
        assert!(rewritten.contains(r#"name="Picture 1""#));
    }

    fn fixture_pptx(slide_xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default();
            writer.start_file("ppt/presentation.xml", options).unwrap();
            writer
                .write_all(br#"<p:presentation xmlns:p="ns" xmlns:r="ns"><p:sldIdLst><p:sldId id="256" r:id="rIdSlide1"/></p:sldIdLst></p:presentation>"#)
                .unwrap();
            writer.start_file("ppt/_rels/presentation.xml.rels", options).unwrap();
            writer
                .write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rIdSlide1" Type="slide" Target="slides/slide1.xml"/></Relationships>"#)
                .unwrap();
            writer.start_file("ppt/slides/slide1.xml", options).unwrap();
            writer.write_all(slide_xml.as_bytes()).unwrap();
            writer.start_file("ppt/slides/_rels/slide1.xml.rels", options).unwrap();
            writer
                .write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rIdImg1" Type="image" Target="../media/image1.png"/></Relationships>"#)
                .unwrap();
            writer.start_file("ppt/media/image1.png", options).unwrap();
            writer.write_all(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn apply_rewrites_targeted_slide_and_reports_success() {
        let original = fixture_pptx(SLIDE_XML);
        let results = vec![sample_result(Locator::pptx(0, 0), "A quarterly revenue chart.")];

        let assembled = PptxAssembler.apply(&original, &results).unwrap();
        assert_eq!(
            assembled.status.get(Locator::pptx(0, 0).as_str()).map(String::as_str),
            Some("success")
        );

        let mut archive = ZipArchive::new(Cursor::new(&assembled.bytes)).unwrap();
        let mut slide = String::new();
        archive.by_name("ppt/slides/slide1.xml").unwrap().read_to_string(&mut slide).unwrap();
        assert!(slide.contains(r#"descr="A quarterly revenue chart.""#));
    }

    #[test]
    fn apply_records_failure_for_out_of_range_shape() {
        let original = fixture_pptx(SLIDE_XML);
        let results = vec![sample_result(Locator::pptx(0, 5), "Unreachable.")];
        let assembled = PptxAssembler.apply(&original, &results).unwrap();
        assert!(assembled
            .status
            .get(Locator::pptx(0, 5).as_str())
            .unwrap()
            .starts_with("failed"));
    }
}
