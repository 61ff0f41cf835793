//! Pipeline configuration. Built once at startup via [`PipelineConfig::
//! builder`] and passed by reference into every component constructor —
//! nothing downstream reads the environment or a global on its own.

/// Extraction-stage limits (§6 configuration table).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionLimits {
    pub max_images_per_document: usize,
    pub max_file_size_mb: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_images_per_document: 100,
            max_file_size_mb: 50,
        }
    }
}

/// Context-builder tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// DOCX local-tier window, paragraphs strictly before the image.
    pub paragraphs_before: u32,
    /// DOCX local-tier window, paragraphs strictly after the image.
    pub paragraphs_after: u32,
    pub max_context_chars: usize,
    /// Cap on the external `.txt`/`.md` context file, in characters.
    pub max_external_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            paragraphs_before: 2,
            paragraphs_after: 2,
            max_context_chars: 12_000,
            max_external_chars: 10_000,
        }
    }
}

/// Exponential backoff parameters for the retry policy (§4.3.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_seconds: f64,
    pub backoff_base: f64,
    pub max_delay_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_seconds: 1.0,
            backoff_base: 2.0,
            max_delay_seconds: 60.0,
        }
    }
}

impl RetryPolicy {
    /// `delay_k = min(initial * base^k, cap)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> f64 {
        let delay = self.initial_delay_seconds * self.backoff_base.powi(attempt as i32);
        delay.min(self.max_delay_seconds)
    }
}

/// Model call settings passed through to every generator request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

/// Top-level, immutable configuration for one pipeline run. Construct via
/// [`PipelineConfig::builder`]; there is no implicit global and nothing in
/// `doc2alt` reads `std::env` outside the CLI's own startup function and
/// `AzureOpenAiVisionClient::from_env`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub extraction: ExtractionLimits,
    pub context: ContextConfig,
    pub retry: RetryPolicy,
    pub model: ModelSettings,
    /// Stop tolerating per-image failures and propagate the first one
    /// instead. Used by tests and by callers that want fail-fast behavior.
    pub continue_on_error: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionLimits::default(),
            context: ContextConfig::default(),
            retry: RetryPolicy::default(),
            model: ModelSettings::default(),
            continue_on_error: true,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder with clamping setters, mirroring the validated-builder shape
/// used for multi-stage document-conversion configuration elsewhere in the
/// ecosystem: each setter clamps to its documented range rather than
/// accepting an invalid value silently.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_images_per_document(mut self, n: usize) -> Self {
        self.config.extraction.max_images_per_document = n;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.extraction.max_file_size_mb = mb;
        self
    }

    pub fn context_paragraphs_before(mut self, n: u32) -> Self {
        self.config.context.paragraphs_before = n.clamp(0, 10);
        self
    }

    pub fn context_paragraphs_after(mut self, n: u32) -> Self {
        self.config.context.paragraphs_after = n.clamp(0, 10);
        self
    }

    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.config.context.max_context_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn initial_delay_seconds(mut self, secs: f64) -> Self {
        self.config.retry.initial_delay_seconds = secs;
        self
    }

    pub fn backoff_base(mut self, base: f64) -> Self {
        self.config.retry.backoff_base = base;
        self
    }

    pub fn max_delay_seconds(mut self, secs: f64) -> Self {
        self.config.retry.max_delay_seconds = secs;
        self
    }

    pub fn temperature(mut self, value: f32) -> Self {
        self.config.model.temperature = value.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.model.max_tokens = n;
        self
    }

    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.config.continue_on_error = value;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_table() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.model.temperature, 0.3);
        assert_eq!(cfg.model.max_tokens, 500);
        assert_eq!(cfg.context.paragraphs_before, 2);
        assert_eq!(cfg.context.paragraphs_after, 2);
        assert_eq!(cfg.context.max_context_chars, 12_000);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.initial_delay_seconds, 1.0);
        assert_eq!(cfg.retry.backoff_base, 2.0);
        assert_eq!(cfg.retry.max_delay_seconds, 60.0);
        assert_eq!(cfg.extraction.max_images_per_document, 100);
        assert_eq!(cfg.extraction.max_file_size_mb, 50);
    }

    #[test]
    fn builder_clamps_context_window() {
        let cfg = PipelineConfig::builder()
            .context_paragraphs_before(99)
            .context_paragraphs_after(0)
            .build();
        assert_eq!(cfg.context.paragraphs_before, 10);
        assert_eq!(cfg.context.paragraphs_after, 0);
    }

    #[test]
    fn backoff_schedule_matches_formula() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), 1.0);
        assert_eq!(policy.delay_for_attempt(1), 2.0);
        assert_eq!(policy.delay_for_attempt(2), 4.0);
        assert_eq!(policy.delay_for_attempt(10), 60.0); // capped
    }
}
