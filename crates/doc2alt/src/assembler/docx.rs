//! DOCX alt-text assembly (§4.4 DOCX algorithm).

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::{AssembledDocument, Assembler, StatusMap};
use crate::error::Error;
use crate::extractor::DocumentFormat;
use crate::model::AltTextResult;

pub struct DocxAssembler;

const DOCUMENT_PART: &str = "word/document.xml";

impl Assembler for DocxAssembler {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn apply(&self, data: &[u8], results: &[AltTextResult]) -> Result<AssembledDocument, Error> {
        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| Error::Processing(format!("not a valid DOCX archive: {e}")))?;

        let mut status: StatusMap = HashMap::new();
        let mut edits: HashMap<(usize, usize), String> = HashMap::new();
        for result in results {
            match result.locator.parse_docx() {
                Some(key) => {
                    edits.insert(key, result.text.clone());
                }
                None => {
                    status.insert(
                        result.locator.as_str().to_string(),
                        "failed: locator is not a DOCX locator".to_string(),
                    );
                }
            }
        }

        let document_xml = {
            let mut file = archive
                .by_name(DOCUMENT_PART)
                .map_err(|e| Error::Processing(format!("{DOCUMENT_PART} missing: {e}")))?;
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            content
        };

        let (rewritten, applied) = rewrite_document_xml(&document_xml, &edits);

        for result in results {
            if let Some(key) = result.locator.parse_docx() {
                let verdict = if applied.contains(&key) {
                    "success".to_string()
                } else {
                    "failed: image not found at locator".to_string()
                };
                status.insert(result.locator.as_str().to_string(), verdict);
            }
        }

        let bytes = write_with_replacement(&mut archive, DOCUMENT_PART, rewritten.as_bytes())?;

        Ok(AssembledDocument { bytes, status })
    }
}

/// Walk paragraphs exactly as the extractor does, rewriting only the
/// `title`/`descr` attributes of each targeted image's `docPr`. Returns the
/// new XML and the set of `(paragraph_index, within_paragraph_index)` keys
/// actually found and edited.
fn rewrite_document_xml(
    document_xml: &str,
    edits: &HashMap<(usize, usize), String>,
) -> (String, HashSet<(usize, usize)>) {
    let mut reader = Reader::from_str(document_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut paragraph_index: i64 = -1;
    let mut within_paragraph_index = 0usize;
    let mut applied = HashSet::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"p" && e.name().as_ref().starts_with(b"w:") {
                    paragraph_index += 1;
                    within_paragraph_index = 0;
                }
                let _ = writer.write_event(Event::Start(e));
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"p" && e.name().as_ref().starts_with(b"w:") {
                    paragraph_index += 1;
                    within_paragraph_index = 0;
                }

                if e.local_name().as_ref() == b"docPr" && paragraph_index >= 0 {
                    let key = (paragraph_index as usize, within_paragraph_index);
                    if let Some(text) = edits.get(&key) {
                        let rewritten = set_attrs(&e, &[("title", text), ("descr", text)]);
                        applied.insert(key);
                        let _ = writer.write_event(Event::Empty(rewritten));
                        continue;
                    }
                }

                if e.local_name().as_ref() == b"blip" && paragraph_index >= 0 {
                    within_paragraph_index += 1;
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
    (String::from_utf8(bytes).unwrap_or_default(), applied)
}

/// Return a copy of `e` with each `(name, value)` in `replacements` set,
/// replacing the attribute if present or appending it otherwise, and every
/// other attribute carried over unchanged.
pub(crate) fn set_attrs(e: &BytesStart, replacements: &[(&str, &str)]) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut new_elem = BytesStart::new(name);
    let mut applied = vec![false; replacements.len()];

    for attr in e.attributes().flatten() {
        let qualified_key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let local = attr.key.local_name().as_ref().to_vec();
        if let Some(idx) = replacements.iter().position(|(name, _)| name.as_bytes() == local.as_slice()) {
            new_elem.push_attribute((qualified_key.as_str(), replacements[idx].1));
            applied[idx] = true;
        } else {
            let value = attr.unescape_value().unwrap_or_default().into_owned();
            new_elem.push_attribute((qualified_key.as_str(), value.as_str()));
        }
    }

    for (idx, (name, value)) in replacements.iter().enumerate() {
        if !applied[idx] {
            new_elem.push_attribute((*name, *value));
        }
    }

    new_elem
}

/// Rebuild the ZIP archive, replacing only `target_path`'s bytes and
/// copying every other entry verbatim via `raw_copy_file`.
pub(crate) fn write_with_replacement<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    target_path: &str,
    replacement: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    {
        let mut writer = ZipWriter::new(Cursor::new(&mut output));
        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name().to_string();
            if name == target_path {
                let options = SimpleFileOptions::default().compression_method(file.compression());
                drop(file);
                writer.start_file(name, options)?;
                writer.write_all(replacement)?;
            } else {
                writer.raw_copy_file(file)?;
            }
        }
        writer.finish()?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Locator;
    use chrono::Utc;
    use zip::write::SimpleFileOptions as TestFileOptions;

    const DOC_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><w:body><w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" descr=""/><a:graphic><a:graphicData><pic:pic><pic:blipFill><a:blip r:embed="rId2"/></pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p></w:body></w:document>"#;

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
    fn rewrite_sets_title_and_descr_and_preserves_id_attribute() {
        let mut edits = HashMap::new();
        edits.insert((0, 0), "A red balloon.".to_string());
        let (rewritten, applied) = rewrite_document_xml(DOC_XML, &edits);
        assert!(applied.contains(&(0, 0)));
        assert!(rewritten.contains(r#"title="A red balloon.""#));
        assert!(rewritten.contains(r#"descr="A red balloon.""#));
        assert!(rewritten.contains(r#"id="1""#));
    }

    #[test]
    fn rewrite_records_nothing_applied_for_missing_locator() {
        let mut edits = HashMap::new();
        edits.insert((5, 0), "Unreachable.".to_string());
        let (_rewritten, applied) = rewrite_document_xml(DOC_XML, &edits);
        assert!(applied.is_empty());
    }

    fn fixture_docx(document_xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut buf));
            let options = TestFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.start_file("word/_rels/document.xml.rels", options).unwrap();
            writer
                .write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId2" Type="image" Target="media/image1.png"/></Relationships>"#)
                .unwrap();
            writer.start_file("word/media/image1.png", options).unwrap();
            writer.write_all(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn apply_rewrites_target_part_and_leaves_other_entries_readable() {
        let original = fixture_docx(DOC_XML);
        let results = vec![sample_result(Locator::docx(0, 0), "A red balloon.")];

        let assembled = DocxAssembler.apply(&original, &results).unwrap();
        assert_eq!(
            assembled.status.get(Locator::docx(0, 0).as_str()).map(String::as_str),
            Some("success")
        );

        let mut archive = ZipArchive::new(Cursor::new(&assembled.bytes)).unwrap();
        let mut doc = String::new();
        archive.by_name("word/document.xml").unwrap().read_to_string(&mut doc).unwrap();
        assert!(doc.contains(r#"descr="A red balloon.""#));

        let mut media = Vec::new();
        archive.by_name("word/media/image1.png").unwrap().read_to_end(&mut media).unwrap();
        assert_eq!(media, vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }

    #[test]
    fn apply_records_failure_for_out_of_range_locator() {
        let original = fixture_docx(DOC_XML);
        let results = vec![sample_result(Locator::docx(9, 0), "Unreachable.")];
        let assembled = DocxAssembler.apply(&original, &results).unwrap();
        assert!(assembled
            .status
            .get(Locator::docx(9, 0).as_str())
            .unwrap()
            .starts_with("failed"));
    }
}
