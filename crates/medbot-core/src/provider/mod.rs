pub mod gemini;
pub mod openai_compat;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ProviderError;
use crate::types::{CompletionResponse, Message};

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Create the appropriate provider based on model name and config.
pub fn create_provider(
    api_key: &str,
    api_base: Option<&str>,
    default_model: &str,
) -> Box<dyn LlmProvider> {
    let model_lower = default_model.to_lowercase();

    // Use native Gemini provider
    if model_lower.contains("gemini") && !model_lower.contains("openrouter") {
        return Box::new(gemini::GeminiProvider::new(
            api_key.to_string(),
            api_base.map(|s| s.to_string()),
            default_model.to_string(),
        ));
    }

    // Default: OpenAI-compatible provider (works with OpenRouter, DeepSeek, Groq, etc.)
    Box::new(openai_compat::OpenAiCompatProvider::new(
        api_key.to_string(),
        api_base.map(|s| s.to_string()),
        default_model.to_string(),
    ))
}

/// Build the provider chain from config: the configured model first, then the
/// other family as fallback when it has a key.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    let model = config.generation.model.as_str();
    let model_is_gemini = model.to_lowercase().contains("gemini");
    let gemini = &config.providers.gemini;
    let openai = &config.providers.openai;
    let (primary, secondary) = if model_is_gemini {
        (gemini, openai)
    } else {
        (openai, gemini)
    };

    let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();
    if !primary.api_key.is_empty() {
        providers.push(Arc::from(create_provider(
            &primary.api_key,
            primary.api_base.as_deref(),
            model,
        )));
    }
    if !secondary.api_key.is_empty() {
        let fallback_model = if model_is_gemini {
            "gpt-4o-mini"
        } else {
            "gemini-2.0-flash"
        };
        providers.push(Arc::from(create_provider(
            &secondary.api_key,
            secondary.api_base.as_deref(),
            fallback_model,
        )));
    }

    match providers.len() {
        0 => Err(ProviderError::NoApiKey),
        1 => Ok(providers.remove(0)),
        _ => Ok(Arc::new(FallbackProvider::new(providers))),
    }
}

/// Tries providers in order until one succeeds.
pub struct FallbackProvider {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl FallbackProvider {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Model to request from a provider other than the primary one.
    fn model_for(provider: &dyn LlmProvider, requested: &str) -> String {
        let same_family = provider.default_model().to_lowercase().contains("gemini")
            == requested.to_lowercase().contains("gemini");
        if same_family {
            requested.to_string()
        } else {
            provider.default_model().to_string()
        }
    }
}

#[async_trait]
impl LlmProvider for FallbackProvider {
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut last_error = ProviderError::Other("No providers configured".to_string());

        for (idx, provider) in self.providers.iter().enumerate() {
            let model_name = Self::model_for(provider.as_ref(), model);
            if idx > 0 {
                info!("Fallback provider {}: using model {}", idx, model_name);
            }
            match provider
                .chat(messages, &model_name, max_tokens, temperature)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!("Provider {} failed for model {}: {}", idx, model_name, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn default_model(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.default_model())
            .unwrap_or("gemini-2.0-flash")
    }
}
