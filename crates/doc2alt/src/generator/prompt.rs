//! Prompt construction for one image (§4.3 step 1).

/// System guideline plus the merged context text, handed to a
/// [`super::VisionClient`] alongside the raw image bytes. The image itself
/// travels as `image_bytes`/`mime_type` on the `describe` call, not inside
/// this bundle, so a client can choose its own transport (data URI, upload,
/// multipart) without the generator knowing.
#[derive(Debug, Clone)]
pub struct PromptBundle {
    pub system: String,
    pub user_text: String,
}

/// Fixed system-role guideline text. Kept as a single constant rather than
/// templated per-call since nothing in it varies with the image or config.
pub const SYSTEM_PROMPT: &str = "You are an accessibility assistant that writes alt text for images \
embedded in office documents. Describe only what is visibly present, in plain factual language \
matched to the technical level of the surrounding document. Prefer 100-150 characters; never \
exceed 250. Do not begin with \"image of\", \"picture of\", \"graphic showing\", \"photo of\", or \
\"screenshot of\" — start directly with the subject. For charts and diagrams, describe the data \
trend or structure being conveyed, not just \"a chart\". For screenshots, describe the \
application state or content shown, not the act of screenshotting. If the image is purely \
decorative and carries no information, respond with the single word \"decorative\".";

/// User-role text part: the merged context string, or a note that none was
/// available.
pub fn user_text(merged_context: &str) -> String {
    if merged_context.is_empty() {
        "No surrounding document context is available for this image.".to_string()
    } else {
        format!("Surrounding document context:\n{merged_context}")
    }
}

/// Build the full [`PromptBundle`] for one image's merged context.
pub fn build(merged_context: &str) -> PromptBundle {
    PromptBundle { system: SYSTEM_PROMPT.to_string(), user_text: user_text(merged_context) }
}
