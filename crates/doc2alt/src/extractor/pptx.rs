//! PPTX image extraction (§4.1 PPTX algorithm).

use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use super::ooxml;
use super::{DocumentFormat, Extractor};
use crate::config::ExtractionLimits;
use crate::error::Error;
use crate::model::{FormatPosition, ImageRecord, Locator};

pub struct PptxExtractor;

impl Extractor for PptxExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pptx
    }

    fn extract(&self, data: &[u8], limits: &ExtractionLimits) -> Result<Vec<ImageRecord>, Error> {
        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| Error::Processing(format!("not a valid PPTX archive: {e}")))?;

        let presentation_xml = ooxml::read_entry_string(&mut archive, "ppt/presentation.xml")
            .map_err(|_| Error::Processing("ppt/presentation.xml missing".to_string()))?;
        let presentation_rels =
            ooxml::read_entry_string(&mut archive, "ppt/_rels/presentation.xml.rels")
                .unwrap_or_default();
        let presentation_relationships = ooxml::parse_relationships(&presentation_rels);

        let slide_rids = slide_relationship_ids(&presentation_xml);

        let mut records = Vec::new();
        'slides: for (slide_index, rid) in slide_rids.iter().enumerate() {
            let Some(target) = presentation_relationships.get(rid) else {
                tracing::warn!(slide_index, "unresolved slide relationship, skipping slide");
                continue;
            };
            let slide_path = ooxml::resolve_target("ppt", target);

            let slide_xml = match ooxml::read_entry_string(&mut archive, &slide_path) {
                Ok(xml) => xml,
                Err(e) => {
                    tracing::warn!(slide_index, path = %slide_path, error = %e, "failed to read slide, skipping");
                    continue;
                }
            };

            let slide_rels_path = ooxml::rels_path_for(&slide_path);
            let slide_rels_xml =
                ooxml::read_entry_string(&mut archive, &slide_rels_path).unwrap_or_default();
            let slide_relationships = ooxml::parse_relationships(&slide_rels_xml);
            let slide_part_dir = ooxml::part_dir(&slide_path);

            let host_hint = slide_title(&slide_xml);

            for (shape_index, pic) in find_picture_shapes(&slide_xml).into_iter().enumerate() {
                if records.len() >= limits.max_images_per_document {
                    tracing::warn!("max_images_per_document reached, skipping remaining images");
                    break 'slides;
                }

                let Some(rid) = &pic.relationship_id else {
                    continue;
                };
                let Some(target) = slide_relationships.get(rid) else {
                    tracing::warn!(rid = %rid, "unresolved image relationship, skipping");
                    continue;
                };
                let media_path = ooxml::resolve_target(slide_part_dir, target);

                let bytes = match ooxml::read_entry_bytes(&mut archive, &media_path) {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::warn!(path = %media_path, error = %e, "failed to read image bytes, skipping");
                        continue;
                    }
                };

                let Some((format, pixel_width, pixel_height)) =
                    ooxml::decode_image_metadata(&bytes)
                else {
                    tracing::warn!(path = %media_path, "failed to decode image dimensions, skipping");
                    continue;
                };

                let existing_alt_text = pic
                    .name
                    .clone()
                    .filter(|n| !is_default_picture_name(n))
                    .or_else(|| pic.title.clone())
                    .or_else(|| pic.descr.clone());

                records.push(ImageRecord {
                    locator: Locator::pptx(slide_index, shape_index),
                    bytes,
                    format,
                    pixel_width,
                    pixel_height,
                    format_position: FormatPosition::Pptx {
                        slide_index,
                        shape_index,
                        left_emu: pic.left_emu.unwrap_or(0),
                        top_emu: pic.top_emu.unwrap_or(0),
                        width_emu: pic.width_emu.unwrap_or(0),
                        height_emu: pic.height_emu.unwrap_or(0),
                    },
                    existing_alt_text,
                    host_hint: host_hint.clone(),
                });
            }
        }

        Ok(records)
    }
}

/// `Picture \d+` is the default name PowerPoint assigns; it carries no
/// accessibility information so it does not count as existing alt text.
fn is_default_picture_name(name: &str) -> bool {
    name.strip_prefix("Picture ")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

struct PictureShape {
    relationship_id: Option<String>,
    name: Option<String>,
    title: Option<String>,
    descr: Option<String>,
    left_emu: Option<i64>,
    top_emu: Option<i64>,
    width_emu: Option<i64>,
    height_emu: Option<i64>,
}

/// Find every `p:pic` element on a slide, in document order. Ordinal
/// position among these (not among all shapes) is the `shape_index`.
fn find_picture_shapes(slide_xml: &str) -> Vec<PictureShape> {
    let mut reader = Reader::from_str(slide_xml);
    let mut shapes = Vec::new();

    let mut depth_in_pic: i32 = 0;
    let mut current: Option<PictureShape> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"pic" if e.name().as_ref().starts_with(b"p:") => {
                        depth_in_pic += 1;
                        current = Some(PictureShape {
                            relationship_id: None,
                            name: None,
                            title: None,
                            descr: None,
                            left_emu: None,
                            top_emu: None,
                            width_emu: None,
                            height_emu: None,
                        });
                    }
                    b"cNvPr" if current.is_some() => {
                        if let Some(pic) = current.as_mut() {
                            pic.name = attr_value(e, "name");
                            pic.title = attr_value(e, "title").filter(|v| !v.is_empty());
                            pic.descr = attr_value(e, "descr").filter(|v| !v.is_empty());
                        }
                    }
                    b"blip" if current.is_some() => {
                        if let Some(pic) = current.as_mut() {
                            pic.relationship_id = attr_value(e, "embed");
                        }
                    }
                    b"off" if current.is_some() => {
                        if let Some(pic) = current.as_mut() {
                            pic.left_emu = attr_value(e, "x").and_then(|v| v.parse().ok());
                            pic.top_emu = attr_value(e, "y").and_then(|v| v.parse().ok());
                        }
                    }
                    b"ext" if current.is_some() => {
                        if let Some(pic) = current.as_mut() {
                            pic.width_emu = attr_value(e, "cx").and_then(|v| v.parse().ok());
                            pic.height_emu = attr_value(e, "cy").and_then(|v| v.parse().ok());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"pic"
                    && e.name().as_ref().starts_with(b"p:")
                    && depth_in_pic > 0
                {
                    depth_in_pic -= 1;
                    if let Some(pic) = current.take() {
                        shapes.push(pic);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    shapes
}

/// The relationship ids of every slide referenced by `p:sldIdLst`, in
/// document (slide) order. `pub(crate)` so the assembler can resolve the
/// same slide ordering without re-deriving it.
pub(crate) fn slide_relationship_ids(presentation_xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(presentation_xml);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sldId" =>
            {
                // The relationship id attribute is namespace-prefixed
                // (`r:id`); `local_name()` would collide with any other
                // plain `id` attribute, so match on the raw qualified key.
                let rid = e.attributes().flatten().find_map(|a| {
                    a.key
                        .as_ref()
                        .ends_with(b":id")
                        .then(|| a.unescape_value().ok())
                        .flatten()
                        .map(|v| v.into_owned())
                });
                if let Some(rid) = rid {
                    ids.push(rid);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    ids
}

/// The slide's title placeholder text, if one exists, stripped.
pub fn slide_title(slide_xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(slide_xml);
    let mut in_title_shape = false;
    let mut in_other_shape_ph = false;
    let mut in_text = false;
    let mut text = String::new();
    let mut found = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"sp" if e.name().as_ref().starts_with(b"p:") => {
                    in_title_shape = false;
                    in_other_shape_ph = false;
                }
                b"ph" => {
                    let ph_type = attr_value(e, "type");
                    if matches!(ph_type.as_deref(), Some("title") | Some("ctrTitle")) {
                        in_title_shape = true;
                    } else {
                        in_other_shape_ph = true;
                    }
                }
                b"t" if in_title_shape && !in_other_shape_ph => in_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                if let Ok(t) = e.unescape() {
                    text.push_str(&t);
                    found = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"sp" => {
                    in_title_shape = false;
                    in_other_shape_ph = false;
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    let text = text.trim().to_string();
    (found && !text.is_empty()).then_some(text)
}

/// All visible text from non-picture shapes on a slide, concatenated in
/// document order, for the local tier.
pub fn non_picture_shape_text(slide_xml: &str) -> String {
    let mut reader = Reader::from_str(slide_xml);
    let mut in_pic = false;
    let mut in_text = false;
    let mut pieces = Vec::new();
    let mut depth_pic = 0i32;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"pic" if e.name().as_ref().starts_with(b"p:") => {
                    in_pic = true;
                    depth_pic += 1;
                }
                b"t" if !in_pic => in_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                if let Ok(t) = e.unescape() {
                    pieces.push(t.into_owned());
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"pic" if depth_pic > 0 => {
                    depth_pic -= 1;
                    if depth_pic == 0 {
                        in_pic = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    pieces.join(" ")
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

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><p:cSld><p:spTree><p:sp><p:nvSpPr><p:cNvPr id="1" name="Title"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>Image Slide</a:t></a:r></a:p></p:txBody></p:sp><p:pic><p:nvPicPr><p:cNvPr id="10" name="Picture"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rIdImg1"/></p:blipFill></p:pic></p:spTree></p:cSld></p:sld>"#;

    #[test]
    fn finds_picture_shape_and_its_relationship_id() {
        let shapes = find_picture_shapes(SLIDE_XML);
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].relationship_id.as_deref(), Some("rIdImg1"));
        assert_eq!(shapes[0].name.as_deref(), Some("Picture"));
    }

    #[test]
    fn text_box_between_pictures_does_not_count_as_a_picture_shape() {
        let xml = r#"<p:sld xmlns:p="ns" xmlns:a="ns" xmlns:r="ns"><p:cSld><p:spTree>
          <p:pic><p:nvPicPr><p:cNvPr id="2" name="Picture 1"/></p:nvPicPr><p:blipFill><a:blip r:embed="rId1"/></p:blipFill></p:pic>
          <p:sp><p:nvSpPr><p:cNvPr id="3" name="TextBox 1"/></p:nvSpPr></p:sp>
          <p:pic><p:nvPicPr><p:cNvPr id="4" name="Picture 2"/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill></p:pic>
          <p:pic><p:nvPicPr><p:cNvPr id="5" name="Picture 3"/></p:nvPicPr><p:blipFill><a:blip r:embed="rId3"/></p:blipFill></p:pic>
        </p:spTree></p:cSld></p:sld>"#;
        let shapes = find_picture_shapes(xml);
        assert_eq!(shapes.len(), 3);
        assert_eq!(shapes[0].relationship_id.as_deref(), Some("rId1"));
        assert_eq!(shapes[1].relationship_id.as_deref(), Some("rId2"));
        assert_eq!(shapes[2].relationship_id.as_deref(), Some("rId3"));
    }

    #[test]
    fn default_picture_name_is_not_existing_alt_text() {
        assert!(is_default_picture_name("Picture 3"));
        assert!(!is_default_picture_name("Quarterly revenue chart"));
        assert!(!is_default_picture_name("Picture"));
    }

    #[test]
    fn slide_title_reads_title_placeholder_only() {
        assert_eq!(slide_title(SLIDE_XML).as_deref(), Some("Image Slide"));
    }

    #[test]
    fn non_picture_shape_text_excludes_picture_runs() {
        let text = non_picture_shape_text(SLIDE_XML);
        assert_eq!(text, "Image Slide");
    }
}
