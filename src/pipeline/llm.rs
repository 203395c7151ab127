//! VLM interaction: build the extraction request and call the provider.
//!
//! One request per document: a fixed system instruction, then a single user
//! turn holding a short text part followed by one image part per page, in page
//! order. The three generation knobs are forwarded as-is. There is no retry;
//! a failed call fails that document only.
//!
//! The provider sits behind [`ExtractionBackend`] so a session can run against
//! any `edgequake_llm` provider, or a scripted backend in tests.

use crate::config::ExtractionConfig;
use crate::error::ExternalServiceError;
use crate::prompts::{EXTRACTION_SYSTEM_PROMPT, EXTRACTION_USER_TEXT};
use crate::record::PageImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, OpenAIProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Messages and sampling options for one document's request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub options: CompletionOptions,
}

/// Text and token usage of the model's single response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A multimodal model that answers one chat request with one text reply.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Send the request once and return the raw reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<ModelReply, ExternalServiceError>;
}

/// Build the single request for one document.
pub fn build_request(pages: &[PageImage], config: &ExtractionConfig) -> ChatRequest {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(EXTRACTION_SYSTEM_PROMPT);

    let images = pages
        .iter()
        .map(|page| page.to_image_data(config.image_detail))
        .collect();

    ChatRequest {
        messages: vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(EXTRACTION_USER_TEXT, images),
        ],
        options: build_options(config),
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens as usize),
        top_p: Some(config.top_p),
        ..Default::default()
    }
}

/// Build the request for `pages` and make the one call for this document.
pub async fn request_extraction(
    backend: &dyn ExtractionBackend,
    filename: &str,
    pages: &[PageImage],
    config: &ExtractionConfig,
) -> Result<ModelReply, ExternalServiceError> {
    let request = build_request(pages, config);
    debug!(
        "{}: sending {} page image(s) to {}",
        filename,
        pages.len(),
        backend.name()
    );

    match backend.complete(&request).await {
        Ok(reply) => {
            debug!(
                "{}: {} input tokens, {} output tokens",
                filename, reply.prompt_tokens, reply.completion_tokens
            );
            Ok(reply)
        }
        Err(e) => {
            warn!("{}: model call failed: {}", filename, e);
            Err(e)
        }
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// [`ExtractionBackend`] over any `edgequake_llm` provider.
#[derive(Clone)]
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    timeout_secs: u64,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout_secs,
        }
    }

    /// OpenAI-compatible provider at the configured endpoint, forwarding the
    /// configured credential.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let provider = OpenAIProvider::compatible(
            config.api_key.clone().unwrap_or_default(),
            config.endpoint.clone(),
        )
        .with_model(&config.model);
        Self::new(Arc::new(provider), config.api_timeout_secs)
    }

    /// Model ID the provider sends requests to.
    pub fn model(&self) -> &str {
        self.provider.model()
    }
}

#[async_trait]
impl ExtractionBackend for ProviderBackend {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ModelReply, ExternalServiceError> {
        let call = self.provider.chat(&request.messages, Some(&request.options));
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| ExternalServiceError::Timeout {
                secs: self.timeout_secs,
            })?
            .map_err(|e| classify_llm_error(e, self.timeout_secs))?;

        if response.content.trim().is_empty() {
            return Err(ExternalServiceError::EmptyResponse);
        }
        Ok(ModelReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens as u32,
            completion_tokens: response.completion_tokens as u32,
        })
    }
}

/// Map a provider error onto the extraction error taxonomy.
fn classify_llm_error(err: LlmError, timeout_secs: u64) -> ExternalServiceError {
    match err {
        LlmError::AuthError(detail) => ExternalServiceError::Auth { detail },
        LlmError::RateLimited(detail) => ExternalServiceError::RateLimited { detail },
        LlmError::Timeout => ExternalServiceError::Timeout { secs: timeout_secs },
        LlmError::NetworkError(detail) => ExternalServiceError::Transport(detail),
        LlmError::SerializationError(e) => {
            ExternalServiceError::Transport(format!("invalid response body: {e}"))
        }
        e @ (LlmError::InvalidRequest(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ModelNotFound(_)) => ExternalServiceError::InvalidRequest {
            detail: e.to_string(),
        },
        other => ExternalServiceError::Api {
            detail: other.to_string(),
        },
    }
}
