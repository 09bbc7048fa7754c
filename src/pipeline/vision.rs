//! Vision invocation: one page image in, one raw page JSON value out.
//!
//! The remote model sits behind the [`VisionCapability`] trait so the
//! orchestrator never talks to an HTTP client directly. Production code uses
//! [`LlmVisionCapability`] over an `edgequake_llm` provider; tests plug in a
//! scripted fake.
//!
//! ## Retry Strategy
//!
//! Only [`FailureKind::RateLimited`] and [`FailureKind::Transient`] failures
//! are retried, with the exponential backoff and jitter described by
//! [`RetryPolicy`]. Auth and unclassified failures are returned on the first
//! attempt.
//!
//! ## Malformed output
//!
//! A response that cannot be parsed as a JSON object is *not* an error.
//! It becomes an empty page, which then fails no schema check but carries no
//! text, so the fallback stage can still rescue it from the PDF text layer.

use crate::config::RetryPolicy;
use crate::error::{CapabilityError, FailureKind, LayoutError};
use crate::pipeline::postprocess;
use crate::pipeline::render::RenderedPage;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, warn};

/// JSON mode for providers that support it; others ignore the option.
pub const JSON_OBJECT_FORMAT: &str = "json_object";

/// One extraction request.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    /// 1-based page number, for logging and error context.
    pub page_number: usize,
    pub image: &'a ImageData,
    pub instruction: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
    /// This is the second extraction of the page.
    pub reask: bool,
}

/// Raw model output plus token accounting.
#[derive(Debug, Clone, Default)]
pub struct VisionResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anything that can turn a page image and an instruction into page JSON.
#[async_trait]
pub trait VisionCapability: Send + Sync {
    /// Provider name used in errors and logs.
    fn name(&self) -> &str;

    async fn extract(&self, request: VisionRequest<'_>) -> Result<VisionResponse, CapabilityError>;
}

/// [`VisionCapability`] backed by an `edgequake_llm` chat provider.
pub struct LlmVisionCapability {
    provider: Arc<dyn LLMProvider>,
    name: String,
}

impl LlmVisionCapability {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl VisionCapability for LlmVisionCapability {
    fn name(&self) -> &str {
        &self.name
    }

    /// One user turn carrying both the instruction and the page image.
    async fn extract(&self, request: VisionRequest<'_>) -> Result<VisionResponse, CapabilityError> {
        let messages = vec![ChatMessage::user_with_images(
            request.instruction,
            vec![request.image.clone()],
        )];
        let options = completion_options(&request);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(CapabilityError::from)?;

        Ok(VisionResponse {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

fn completion_options(request: &VisionRequest<'_>) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        response_format: Some(JSON_OBJECT_FORMAT.to_string()),
        ..Default::default()
    }
}

/// The result of one successful invocation.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Parsed page JSON, or the empty page when the output was unusable.
    pub value: Value,
    /// False when the model output could not be parsed.
    pub parsed: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Placeholder for output that is not a JSON object.
pub fn empty_page() -> Value {
    json!({ "page_number": 0, "width_px": 0, "height_px": 0, "blocks": [] })
}

/// Drives a [`VisionCapability`] with retry and error classification.
#[derive(Clone)]
pub struct VisionInvoker {
    capability: Arc<dyn VisionCapability>,
    retry: RetryPolicy,
    temperature: f32,
    max_tokens: usize,
}

impl VisionInvoker {
    pub fn new(
        capability: Arc<dyn VisionCapability>,
        retry: RetryPolicy,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            capability,
            retry,
            temperature,
            max_tokens,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.capability.name()
    }

    /// Extract one page, retrying throttled and transient failures.
    ///
    /// # Errors
    /// - [`LayoutError::AuthError`] on the first auth failure
    /// - [`LayoutError::RateLimitExceeded`] / [`LayoutError::ProviderUnavailable`]
    ///   once `max_attempts` retryable failures have been seen
    /// - [`LayoutError::ProviderError`] for anything unclassified
    pub async fn invoke(&self, page: &RenderedPage, reask: bool) -> Result<Extraction, LayoutError> {
        let start = Instant::now();
        let page_number = page.page_number();
        let instruction = prompts::page_instruction(page.width_px, page.height_px, reask);
        let request = VisionRequest {
            page_number,
            image: &page.image,
            instruction: &instruction,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            reask,
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.capability.extract(request).await {
                Ok(response) => {
                    let parsed = postprocess::parse_page_json(&response.content);
                    if parsed.is_none() {
                        warn!("Page {}: model output is not a JSON object", page_number);
                    }
                    let duration_ms = start.elapsed().as_millis() as u64;
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {}ms, attempt {}",
                        page_number,
                        response.input_tokens,
                        response.output_tokens,
                        duration_ms,
                        attempt
                    );
                    return Ok(Extraction {
                        parsed: parsed.is_some(),
                        value: parsed.unwrap_or_else(empty_page),
                        input_tokens: response.input_tokens,
                        output_tokens: response.output_tokens,
                        attempts: attempt,
                        duration_ms,
                    });
                }
                Err(err) if err.kind.is_retryable() && attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        "Page {}: attempt {}/{} failed ({:?}), retrying in {:?}: {}",
                        page_number,
                        attempt,
                        self.retry.max_attempts,
                        err.kind,
                        backoff,
                        err.message
                    );
                    sleep(backoff).await;
                }
                Err(err) => return Err(self.fatal(err, page_number, attempt)),
            }
        }
    }

    fn fatal(&self, err: CapabilityError, page: usize, attempts: u32) -> LayoutError {
        let provider = self.provider_name().to_string();
        match err.kind {
            FailureKind::RateLimited => LayoutError::RateLimitExceeded {
                provider,
                page,
                attempts,
            },
            FailureKind::Transient => LayoutError::ProviderUnavailable {
                provider,
                page,
                attempts,
                detail: err.message,
            },
            FailureKind::Auth => LayoutError::AuthError {
                provider,
                detail: err.message,
            },
            FailureKind::Other => LayoutError::ProviderError {
                provider,
                page,
                detail: err.message,
            },
        }
    }
}
