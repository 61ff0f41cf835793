//! Shared OOXML plumbing used by both the DOCX and PPTX extractors (and
//! their matching assemblers): relationship-map parsing and ZIP-entry path
//! resolution. Factored out so neither format duplicates the walk of
//! presentation.xml → rels → slide.xml → slide rels.

use std::collections::HashMap;
use std::io::Read;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::Error;
use crate::model::ImageFormat;

/// Maps relationship id (`rId3`) to the target path it resolves to,
/// relative to the part that owns the `.rels` file.
pub type RelationshipMap = HashMap<String, String>;

/// Parse a `_rels/*.rels` part into its relationship id → target map.
pub fn parse_relationships(xml: &str) -> RelationshipMap {
    let mut reader = Reader::from_str(xml);
    let mut map = RelationshipMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = attr.unescape_value().ok().map(|v| v.into_owned()),
                        b"Target" => target = attr.unescape_value().ok().map(|v| v.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    map.insert(id, target);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    map
}

/// Resolve a relationship `Target` (which may be relative, e.g.
/// `../media/image1.png` or `media/image1.png`) against the directory of
/// the part that owns the rels file, into a normalized ZIP entry path.
pub fn resolve_target(owning_part_dir: &str, target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        return stripped.to_string();
    }

    let mut segments: Vec<&str> = owning_part_dir.split('/').filter(|s| !s.is_empty()).collect();
    for piece in target.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Read one entry's bytes out of an already-open archive as a `String`,
/// for XML parts.
pub fn read_entry_string<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String, Error> {
    let mut file = archive.by_name(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Read one entry's raw bytes, for binary (image) parts.
pub fn read_entry_bytes<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>, Error> {
    let mut file = archive.by_name(path)?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Sniff format and decode pixel dimensions from raw image bytes. A decode
/// failure is reported as `None` rather than an `Err`, per the "skip this
/// image only" error semantics both extractors share.
pub fn decode_image_metadata(bytes: &[u8]) -> Option<(ImageFormat, u32, u32)> {
    let format = ImageFormat::from_magic(bytes)?;
    let reader = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some((format, width, height))
}

/// Directory part of a ZIP entry path, e.g. `ppt/slides` for
/// `ppt/slides/slide1.xml`. Used to resolve a part's own `_rels` path and
/// any relative relationship targets it carries.
pub fn part_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The `_rels/<filename>.rels` path belonging to a part.
pub fn rels_path_for(path: &str) -> String {
    let dir = part_dir(path);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if dir.is_empty() {
        format!("_rels/{file_name}.rels")
    } else {
        format!("{dir}/_rels/{file_name}.rels")
    }
}
