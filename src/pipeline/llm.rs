//! VLM interaction: build vision messages, call the model, recover the record.
//!
//! The model sits behind the narrow [`VisionModel`] seam so the orchestrator
//! can be exercised with a scripted fake; [`LlmVisionModel`] adapts any
//! `edgequake_llm` provider. All prompt text lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! Transport errors and timeouts are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`): with 500 ms base and 3 retries the
//! wait sequence is 500 ms → 1 s → 2 s. A reply that arrives but holds no
//! recoverable JSON is final for the page; asking again at temperature 0.1
//! mostly returns the same text.

use crate::config::ParseConfig;
use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::recover;
use crate::prompts::EXTRACTION_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Text and token usage of one model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A chat-capable vision model.
pub trait VisionModel: Send + Sync {
    /// Send one chat request. Errors are reported as display strings.
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &'a CompletionOptions,
    ) -> BoxFuture<'a, Result<ModelReply, String>>;

    /// Human-readable `provider/model` label for logs and output metadata.
    fn label(&self) -> String;
}

/// [`VisionModel`] backed by an `edgequake_llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

impl VisionModel for LlmVisionModel {
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &'a CompletionOptions,
    ) -> BoxFuture<'a, Result<ModelReply, String>> {
        Box::pin(async move {
            let response = self
                .provider
                .chat(messages, Some(options))
                .await
                .map_err(|e| e.to_string())?;
            Ok(ModelReply {
                content: response.content,
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
            })
        })
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Build the request for one page.
///
/// 1. **System message**: the extraction persona (or the caller's override)
/// 2. **User message**: the field list and rules, with the page image attached
pub fn build_messages(image: ImageData, config: &ParseConfig) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(config.effective_system_prompt()),
        ChatMessage::user_with_images(EXTRACTION_PROMPT, vec![image]),
    ]
}

/// Run one page through the model and the recovery pipeline.
///
/// Always returns a `PageResult`; a bad page never aborts the document.
pub async fn process_page(
    model: &dyn VisionModel,
    page_num: usize,
    source: &str,
    image: ImageData,
    config: &ParseConfig,
) -> PageResult {
    let start = Instant::now();
    let messages = build_messages(image, config);
    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<PageError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let reply = match timeout(call_timeout, model.chat(&messages, &options)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = Some(PageError::LlmFailed {
                    page: page_num,
                    retries: config.max_retries,
                    detail: e,
                });
                continue;
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(PageError::Timeout {
                    page: page_num,
                    secs: config.api_timeout_secs,
                });
                continue;
            }
        };

        let duration = start.elapsed();
        debug!(
            "Page {}: {} input tokens, {} output tokens, {} chars, {:?}",
            page_num,
            reply.prompt_tokens,
            reply.completion_tokens,
            reply.content.len(),
            duration
        );

        let (record, error) = match recover(&reply.content, config.recovery_log.as_deref()) {
            Ok(record) => (Some(record), None),
            Err(e) => {
                warn!("Page {}: {}", page_num, e);
                (None, Some(PageError::from_recovery(page_num, e)))
            }
        };

        return PageResult {
            page_num,
            source: source.to_string(),
            record,
            raw_response: reply.content,
            input_tokens: reply.prompt_tokens,
            output_tokens: reply.completion_tokens,
            duration_ms: duration.as_millis() as u64,
            retries: attempt,
            error,
        };
    }

    // All retries exhausted
    let error = last_err.unwrap_or(PageError::LlmFailed {
        page: page_num,
        retries: config.max_retries,
        detail: "Unknown error".to_string(),
    });

    PageResult {
        page_num,
        source: source.to_string(),
        record: None,
        raw_response: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        retries: config.max_retries,
        error: Some(error),
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Build `CompletionOptions` from the parse config.
fn build_options(config: &ParseConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
