//! Core data types shared by every pipeline stage: the image record the
//! extractor produces, the context bundle the context builder assembles,
//! the alt-text result the generator emits, and the processing record the
//! accumulator writes out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raster image format, sniffed from the file's magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl ImageFormat {
    /// Sniff a format from its magic bytes. Returns `None` for anything not
    /// in the supported set.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"BM") {
            Some(Self::Bmp)
        } else {
            None
        }
    }

    /// MIME type used both for the data-URI sent to the vision model and
    /// for `[Content_Types].xml` lookups during extraction.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }

    /// Lowercase name used inside the `data:image/<format>;base64,` URI.
    pub fn data_uri_subtype(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }
}

/// Where within the source document an image sits. Kept opaque to every
/// component except the extractor and the matching assembler; the context
/// builder only reads the `paragraph_index`/`host_hint`-adjacent fields it
/// needs through `ImageRecord`, never this directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormatPosition {
    Docx {
        paragraph_index: usize,
        anchor_type: AnchorType,
    },
    Pptx {
        slide_index: usize,
        shape_index: usize,
        left_emu: i64,
        top_emu: i64,
        width_emu: i64,
        height_emu: i64,
    },
}

/// How a DOCX image is anchored: inline in a run, or floating in a
/// drawing element detached from any run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorType {
    Inline,
    Floating,
}

/// Opaque, serializable handshake token between the extractor and the
/// assembler. Wrapping the locator string in a newtype keeps the
/// `"img-{}-{}"` / `"slide{}_shape{}"` string contract in one place instead
/// of scattered across `format!` calls and ad hoc parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn docx(paragraph_index: usize, within_paragraph_index: usize) -> Self {
        Self(format!("img-{paragraph_index}-{within_paragraph_index}"))
    }

    pub fn pptx(slide_index: usize, shape_index: usize) -> Self {
        Self(format!("slide{slide_index}_shape{shape_index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the DOCX indices this locator encodes, if it is DOCX-shaped.
    pub fn parse_docx(&self) -> Option<(usize, usize)> {
        let rest = self.0.strip_prefix("img-")?;
        let (para, idx) = rest.split_once('-')?;
        Some((para.parse().ok()?, idx.parse().ok()?))
    }

    /// Recover the PPTX indices this locator encodes, if it is PPTX-shaped.
    pub fn parse_pptx(&self) -> Option<(usize, usize)> {
        let rest = self.0.strip_prefix("slide")?;
        let (slide, rest) = rest.split_once("_shape")?;
        Some((slide.parse().ok()?, rest.parse().ok()?))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One embedded image, as yielded by an [`crate::extractor::Extractor`].
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub locator: Locator,
    /// Raw image payload. Transient: released once the generator is done
    /// with this record, never held for the whole document.
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub format_position: FormatPosition,
    /// Alt-text already present in the source. Never written to; purely
    /// informational (and used by the round-trip tests).
    pub existing_alt_text: Option<String>,
    /// Short label for context tier 4 (slide title, nearest heading).
    pub host_hint: Option<String>,
}

/// The five context tiers, in strict priority order. `None` means the tier
/// was absent or failed to build; it is skipped silently during merge.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub external: Option<String>,
    pub document: Option<String>,
    pub section: Option<String>,
    pub page: Option<String>,
    pub local: Option<String>,
}

impl ContextBundle {
    /// Merge present tiers in priority order with `" | "`, each prefixed by
    /// its `[Tier: …]` label, then truncate to `max_chars` on a UTF-8
    /// boundary.
    pub fn merge(&self, max_chars: usize) -> String {
        let tiers: [(&str, &Option<String>); 5] = [
            ("External", &self.external),
            ("Document", &self.document),
            ("Section", &self.section),
            ("Page", &self.page),
            ("Local", &self.local),
        ];

        let merged = tiers
            .iter()
            .filter_map(|(label, value)| {
                value
                    .as_ref()
                    .filter(|s| !s.is_empty())
                    .map(|s| format!("[{label}: {s}]"))
            })
            .collect::<Vec<_>>()
            .join(" | ");

        truncate_utf8(&merged, max_chars)
    }
}

/// Truncate `s` to at most `max_chars` characters, appending `"..."` inside
/// the budget and never splitting a UTF-8 code point.
pub fn truncate_utf8(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Final, validated description for one image, produced by the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AltTextResult {
    pub locator: Locator,
    /// Empty string means "mark as decorative".
    pub text: String,
    pub validation_passed: bool,
    pub warnings: Vec<String>,
    pub confidence: f32,
    pub tokens_used: u32,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// One failed image, recorded instead of a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub locator: Locator,
    pub page_or_slide: Option<usize>,
    pub error_kind: String,
    pub message: String,
}

/// The sole externally visible output besides the annotated document
/// itself. Deserializable so `apply` can read a prior `extract` run's
/// results back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub input_path: String,
    pub output_path: String,
    pub document_format: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<AltTextResult>,
    pub failures: Vec<FailureEntry>,
    pub tokens_used_total: u32,
    pub estimated_cost_usd: f64,
    pub total_duration_seconds: f64,
}

impl ProcessingRecord {
    pub fn new(input_path: String, output_path: String, document_format: String) -> Self {
        Self {
            input_path,
            output_path,
            document_format,
            total: 0,
            successful: 0,
            failed: 0,
            results: Vec::new(),
            failures: Vec::new(),
            tokens_used_total: 0,
            estimated_cost_usd: 0.0,
            total_duration_seconds: 0.0,
        }
    }

    pub fn record_success(&mut self, result: AltTextResult) {
        self.total += 1;
        self.successful += 1;
        self.tokens_used_total += result.tokens_used;
        self.total_duration_seconds += result.duration_seconds;
        self.results.push(result);
    }

    pub fn record_failure(&mut self, failure: FailureEntry) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(failure);
    }
}
