use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::CollaboratorError;
use crate::provider::gemini::GeminiProvider;
use crate::provider::LlmProvider;
use crate::types::{FinishReason, Message};

use super::{TextGenerator, Transcriber, Translator};

const TRANSLATE_SYSTEM: &str = "You are a professional medical translator. Translate the user's \
text faithfully, keep headings and list structure, and reply with the translation only.";

/// Generation and translation backed by an [`LlmProvider`].
pub struct ProviderCollaborator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl ProviderCollaborator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CollaboratorError> {
        let resp = self
            .provider
            .chat(messages, &self.model, self.max_tokens, self.temperature)
            .await?;

        debug!(
            "Completion from {}: {} tokens",
            self.model, resp.usage.total_tokens
        );

        match (resp.finish_reason, resp.content) {
            (FinishReason::Safety, _) => {
                warn!("Completion blocked by safety filter");
                Err(CollaboratorError::Rejected(
                    "blocked by the provider's safety filter".to_string(),
                ))
            }
            (_, Some(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(CollaboratorError::Failed("empty completion".to_string())),
        }
    }
}

#[async_trait]
impl TextGenerator for ProviderCollaborator {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, CollaboratorError> {
        self.complete(&[Message::system(system_instruction), Message::user(prompt)])
            .await
    }
}

#[async_trait]
impl Translator for ProviderCollaborator {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, CollaboratorError> {
        let prompt = format!("Translate into {target_language}:\n\n{text}");
        self.complete(&[Message::system(TRANSLATE_SYSTEM), Message::user(prompt)])
            .await
    }
}

/// Voice message transcription through Gemini's audio input.
pub struct GeminiTranscriber {
    provider: GeminiProvider,
    model: String,
    mime_type: String,
}

impl GeminiTranscriber {
    pub fn new(api_key: &str, api_base: Option<&str>, model: &str) -> Self {
        Self {
            provider: GeminiProvider::new(
                api_key.to_string(),
                api_base.map(|s| s.to_string()),
                model.to_string(),
            ),
            model: model.to_string(),
            // LINE delivers voice messages as m4a
            mime_type: "audio/mp4".to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, CollaboratorError> {
        if audio.is_empty() {
            return Err(CollaboratorError::Rejected("empty audio".to_string()));
        }
        Ok(self
            .provider
            .transcribe(audio, &self.mime_type, &self.model)
            .await?)
    }
}
