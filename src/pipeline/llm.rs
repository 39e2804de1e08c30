//! Vision model interaction: one system prompt plus one page image in, the
//! raw model text out.
//!
//! The [`VisionModel`] trait is the seam the extractor talks to, so tests
//! substitute a canned model. [`LlmVisionModel`] wraps an `edgequake-llm`
//! provider and bounds every call with a timeout.

use crate::config::ExtractionConfig;
use crate::error::Pdf2PoError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A model that reads an image and answers in text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, image: ImageData) -> Result<String, Pdf2PoError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub async fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2PoError> {
        let provider = resolve_provider(config).await?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn complete(&self, system_prompt: &str, image: ImageData) -> Result<String, Pdf2PoError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images("", vec![image]),
        ];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                warn!("Vision model call exceeded {:?}", self.timeout);
                Pdf2PoError::LlmTimeout {
                    secs: self.timeout.as_secs(),
                }
            })?
            .map_err(|e| Pdf2PoError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2PoError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2PoError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (default `gpt-4o`).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. `ProviderFactory::from_env()` auto-detection.
pub async fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, Pdf2PoError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2PoError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision model provider could be detected from the environment.\n\
                Set OPENAI_API_KEY or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
