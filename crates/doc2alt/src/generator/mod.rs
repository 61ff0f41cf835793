//! Generator: builds a prompt for one image, calls the vision model with
//! retry, auto-corrects and validates the result (§4.3).

pub mod prompt;
pub mod retry;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::model::{AltTextResult, FailureEntry, ImageRecord, Locator};
use prompt::PromptBundle;

/// The model's raw answer, before auto-correction/validation.
#[derive(Debug, Clone)]
pub struct VisionResponse {
    pub text: String,
    /// Exact token count if the provider reports one; `None` falls back to
    /// the `ceil(len/4)` estimate.
    pub tokens_used: Option<u32>,
}

/// Injected model dependency. The generator is constructed with one and
/// never instantiates a client itself, so tests substitute a fake and the
/// CLI wires in [`crate::vision::azure_openai::AzureOpenAiVisionClient`].
/// Execution settings (temperature, max tokens) are the client's own
/// concern, configured at construction time, not threaded through this call.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn describe(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &PromptBundle,
    ) -> Result<VisionResponse, Error>;
}

/// Orchestrates one-image-at-a-time alt-text generation.
pub struct Generator {
    client: Arc<dyn VisionClient>,
    config: PipelineConfig,
}

impl Generator {
    pub fn new(client: Arc<dyn VisionClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// `generate(image_record, merged_context) → Alt-Text Result`.
    pub async fn generate(
        &self,
        image: &ImageRecord,
        merged_context: &str,
    ) -> Result<AltTextResult, Error> {
        let bundle = prompt::build(merged_context);
        let mime_type = image.format.content_type();

        let started = Instant::now();
        let client = Arc::clone(&self.client);
        let response = retry::with_backoff(&self.config.retry, || {
            let bundle = bundle.clone();
            let client = Arc::clone(&client);
            async move { client.describe(&image.bytes, mime_type, &bundle).await }
        })
        .await?;
        let duration_seconds = started.elapsed().as_secs_f64();

        let tokens_used = response
            .tokens_used
            .unwrap_or_else(|| response.text.len().div_ceil(4) as u32);

        let corrected = validation::autocorrect(&response.text);
        let outcome = validation::validate(&corrected.text);

        Ok(AltTextResult {
            locator: image.locator.clone(),
            text: corrected.text,
            validation_passed: outcome.passed,
            warnings: outcome.warnings,
            confidence: 1.0,
            tokens_used,
            duration_seconds,
            timestamp: Utc::now(),
        })
    }

    /// Iterate every record, tolerating per-image failure unless
    /// `continue_on_error` is false, in which case the first error aborts
    /// the whole batch (§4.3 batch wrapper).
    pub async fn generate_for_multiple_images(
        &self,
        images: &[ImageRecord],
        contexts: &[String],
    ) -> Result<(Vec<AltTextResult>, Vec<FailureEntry>), Error> {
        let mut results = Vec::new();
        let mut failures = Vec::new();

        for (image, context) in images.iter().zip(contexts.iter()) {
            match self.generate(image, context).await {
                Ok(result) => results.push(result),
                Err(err) if self.config.continue_on_error => {
                    tracing::warn!(locator = %image.locator, error = %err, "recording per-image failure");
                    failures.push(failure_entry(&image.locator, &err));
                }
                Err(err) => return Err(err),
            }
        }

        Ok((results, failures))
    }
}

fn failure_entry(locator: &Locator, err: &Error) -> FailureEntry {
    let page_or_slide = locator.parse_pptx().map(|(slide_index, _)| slide_index + 1);
    FailureEntry {
        locator: locator.clone(),
        page_or_slide,
        error_kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnchorType, FormatPosition, ImageFormat};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn docx_image() -> ImageRecord {
        ImageRecord {
            locator: Locator::docx(0, 0),
            bytes: vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'],
            format: ImageFormat::Png,
            pixel_width: 10,
            pixel_height: 10,
            format_position: FormatPosition::Docx { paragraph_index: 0, anchor_type: AnchorType::Inline },
            existing_alt_text: None,
            host_hint: None,
        }
    }

    struct CannedClient {
        text: &'static str,
    }

    #[async_trait]
    impl VisionClient for CannedClient {
        async fn describe(
            &self,
            _image_bytes: &[u8],
            _mime_type: &str,
            _prompt: &PromptBundle,
        ) -> Result<VisionResponse, Error> {
            Ok(VisionResponse { text: self.text.to_string(), tokens_used: None })
        }
    }

    struct FlakyClient {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl VisionClient for FlakyClient {
        async fn describe(
            &self,
            _image_bytes: &[u8],
            _mime_type: &str,
            _prompt: &PromptBundle,
        ) -> Result<VisionResponse, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(Error::Api { message: "rate limited".into(), status: Some(429), retryable: true })
            } else {
                Ok(VisionResponse { text: "A red balloon against a clear sky.".into(), tokens_used: Some(12) })
            }
        }
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retry.initial_delay_seconds = 0.0;
        config.retry.max_delay_seconds = 0.0;
        config
    }

    #[tokio::test]
    async fn generate_estimates_tokens_when_provider_omits_count() {
        let generator = Generator::new(Arc::new(CannedClient { text: "A red balloon." }), fast_config());
        let result = generator.generate(&docx_image(), "").await.unwrap();
        assert_eq!(result.tokens_used, "A red balloon.".len().div_ceil(4) as u32);
        assert_eq!(result.text, "A red balloon.");
        assert!(result.validation_passed);
    }

    #[tokio::test]
    async fn generate_retries_through_transient_errors_and_succeeds() {
        let generator = Generator::new(
            Arc::new(FlakyClient { calls: AtomicU32::new(0), fail_times: 2 }),
            fast_config(),
        );
        let result = generator.generate(&docx_image(), "").await.unwrap();
        assert_eq!(result.text, "A red balloon against a clear sky.");
        assert_eq!(result.tokens_used, 12);
    }

    #[tokio::test]
    async fn batch_wrapper_records_api_failure_and_continues() {
        let generator = Generator::new(
            Arc::new(FlakyClient { calls: AtomicU32::new(0), fail_times: 99 }),
            fast_config(),
        );
        let images = vec![docx_image()];
        let contexts = vec![String::new()];
        let (results, failures) = generator.generate_for_multiple_images(&images, &contexts).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_kind, "api");
    }

    #[tokio::test]
    async fn batch_wrapper_aborts_on_first_failure_when_continue_on_error_is_false() {
        let mut config = fast_config();
        config.continue_on_error = false;
        let generator = Generator::new(
            Arc::new(FlakyClient { calls: AtomicU32::new(0), fail_times: 99 }),
            config,
        );
        let images = vec![docx_image()];
        let contexts = vec![String::new()];
        let outcome = generator.generate_for_multiple_images(&images, &contexts).await;
        assert!(outcome.is_err());
    }
}
