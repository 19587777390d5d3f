//! Configuration types for water-analysis extraction.
//!
//! All parse behaviour is controlled through [`ParseConfig`], built via its
//! [`ParseConfigBuilder`]. Setters clamp out-of-range values; `build()`
//! rejects combinations that cannot work.

use crate::error::WaterParseError;
use crate::logger::RecoveryLog;
use crate::pipeline::llm::VisionModel;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for extracting a record from one or more page images.
///
/// # Example
/// ```rust
/// use edgequake_water::ParseConfig;
///
/// let config = ParseConfig::builder()
///     .concurrency(2)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct ParseConfig {
    /// Maximum image dimension (width or height) sent to the model. Default: 2000.
    ///
    /// Phone photos of lab forms are often 4000 px or more on the long side;
    /// they are downscaled proportionally before encoding.
    pub max_image_pixels: u32,

    /// Number of pages sent to the model at once. Default: 1.
    ///
    /// Results always come back in page order regardless of this value.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "llama3.2-vision:11b".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model seam. Takes precedence over everything else;
    /// used by tests and by callers with their own transport.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    ///
    /// A dense parameter table with commentary can pass 2 000 tokens; a reply
    /// cut off by this limit is still recovered when the cut is clean enough.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed model call. Default: 3.
    ///
    /// Only transport failures and timeouts are retried. A reply that arrives
    /// but contains no recoverable JSON is a page error, not a retry.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in extraction prompt.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Optional per-page event sink.
    pub progress_callback: Option<ProgressCallback>,

    /// Optional sink for repair diagnostics.
    pub recovery_log: Option<Arc<dyn RecoveryLog>>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_image_pixels: 2000,
            concurrency: 1,
            model: None,
            provider_name: None,
            provider: None,
            vision_model: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            download_timeout_secs: 120,
            api_timeout_secs: 180,
            progress_callback: None,
            recovery_log: None,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseConfig")
            .field("max_image_pixels", &self.max_image_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "vision_model",
                &self.vision_model.as_ref().map(|m| m.label()),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ParseConfig {
    /// Create a new builder for `ParseConfig`.
    pub fn builder() -> ParseConfigBuilder {
        ParseConfigBuilder {
            config: Self::default(),
        }
    }

    /// The system prompt actually sent to the model.
    pub fn effective_system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_SYSTEM_PROMPT)
    }
}

/// Builder for [`ParseConfig`].
#[derive(Debug)]
pub struct ParseConfigBuilder {
    config: ParseConfig,
}

impl ParseConfigBuilder {
    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px.max(256);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn recovery_log(mut self, log: Arc<dyn RecoveryLog>) -> Self {
        self.config.recovery_log = Some(log);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParseConfig, WaterParseError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(WaterParseError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(WaterParseError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(WaterParseError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.system_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(WaterParseError::InvalidConfig(
                "System prompt must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
