//! Auto-correction and validation of model-returned alt text (§4.3.1).

/// Openers the system prompt forbids; checked case-insensitively as
/// substrings of the corrected text.
pub const FORBIDDEN_OPENERS: &[&str] = &[
    "image of",
    "picture of",
    "graphic showing",
    "photo of",
    "screenshot of",
];

/// The marker the system prompt asks the model to return verbatim when an
/// image is purely decorative (see `prompt::SYSTEM_PROMPT`).
const DECORATIVE_MARKER: &str = "decorative";

/// Outcome of [`autocorrect`]: the corrected text plus whether it was
/// recognized as a decorative marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Corrected {
    pub text: String,
    pub decorative: bool,
}

/// Strip, collapse whitespace, terminate with punctuation, then fold
/// decorative markers to the empty string.
pub fn autocorrect(raw: &str) -> Corrected {
    let trimmed = raw.trim();
    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");

    let punctuated = if collapsed.is_empty() || collapsed.ends_with(['.', '!', '?']) {
        collapsed
    } else {
        format!("{collapsed}.")
    };

    if is_decorative_marker(&punctuated) {
        Corrected { text: String::new(), decorative: true }
    } else {
        Corrected { text: punctuated, decorative: false }
    }
}

fn is_decorative_marker(text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    let normalized = text.trim_end_matches(['.', '!', '?']).to_ascii_lowercase();
    normalized == DECORATIVE_MARKER
}

/// Result of running the §4.3.1 validation rule table against corrected
/// text.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub warnings: Vec<String>,
}

/// Apply the hard-fail and soft-warning rules. A decorative (empty) result
/// is exempt from every rule — there is nothing to validate.
pub fn validate(text: &str) -> ValidationOutcome {
    if text.is_empty() {
        return ValidationOutcome { passed: true, warnings: Vec::new() };
    }

    let len = text.chars().count();
    let mut passed = true;
    let mut warnings = Vec::new();

    if len < 10 {
        passed = false;
        warnings.push(format!("text too short: {len} chars, minimum 10"));
    }
    if len > 250 {
        passed = false;
        warnings.push(format!("text too long: {len} chars, maximum 250"));
    }

    if let Some(opener) = forbidden_opener(text) {
        passed = false;
        warnings.push(format!("contains forbidden phrase: '{opener}'"));
    }

    if !(50..=200).contains(&len) {
        warnings.push(format!("text length {len} outside preferred range 50-200"));
    }

    if let Some(first) = text.chars().next() {
        if !first.is_uppercase() {
            warnings.push("first character is not uppercase".to_string());
        }
    }

    ValidationOutcome { passed, warnings }
}

fn forbidden_opener(text: &str) -> Option<&'static str> {
    let lower = text.to_ascii_lowercase();
    FORBIDDEN_OPENERS.iter().find(|opener| lower.contains(*opener)).copied()
}
