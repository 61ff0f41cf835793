use thiserror::Error;

/// Errors that can occur during the extract/generate/assemble pipeline.
///
/// Each variant maps to one of the exit lanes of the error taxonomy: a
/// document-fatal error (`Input`, `Processing`), a per-image outcome that a
/// batch caller may choose to tolerate (`Api`, `Validation`), or a genuinely
/// unanticipated failure (`Other`).
#[derive(Debug, Error)]
pub enum Error {
    /// The input path, extension, or size does not satisfy the pipeline's
    /// preconditions. Fatal; exit code 2.
    #[error("input error: {0}")]
    Input(String),

    /// The document could not be opened, parsed, or saved. Fatal for this
    /// document; exit code 1.
    #[error("processing error: {0}")]
    Processing(String),

    /// The vision model call failed. `retryable` mirrors the classification
    /// used by [`crate::generator::retry`]; `status` carries the HTTP status
    /// code when one was available.
    #[error("model API error (status={status:?}, retryable={retryable}): {message}")]
    Api {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },

    /// Hard-fail validation rules were triggered. Non-fatal: the generator
    /// still surfaces the corrected text with `validation_passed = false`, so
    /// this variant only appears when a caller asks to abort instead of
    /// recording the outcome.
    #[error("validation error: {0:?}")]
    Validation(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    /// Anything not anticipated by the taxonomy above.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Exit code this error should surface as, per the error handling
    /// design's exit-lane table. Per-image failures recorded into a
    /// [`crate::model::ProcessingRecord`] never reach this; it is only
    /// consulted for document-fatal errors that escape the batch wrapper.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Input(_) => 2,
            Error::Processing(_) => 1,
            Error::Api { .. } => 3,
            Error::Validation(_) => 4,
            Error::Io(_) | Error::Zip(_) | Error::Xml(_) => 1,
            Error::Other(_) => 1,
        }
    }

    /// Short, stable discriminant used in [`crate::model::FailureEntry::
    /// error_kind`] and the CLI's stderr summary, never a `Debug` dump.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Input(_) => "input",
            Error::Processing(_) => "processing",
            Error::Api { .. } => "api",
            Error::Validation(_) => "validation",
            Error::Io(_) | Error::Zip(_) | Error::Xml(_) => "processing",
            Error::Other(_) => "processing",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
