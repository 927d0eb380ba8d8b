use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{CompletionResponse, FinishReason, Message, Role, TokenUsage};
use crate::util::http;

use super::LlmProvider;

const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe this audio exactly as spoken. Reply with the transcript only.";

/// Google Gemini API provider.
pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, api_base: Option<String>, default_model: String) -> Self {
        let base = api_base
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
            default_model,
        }
    }

    /// Normalize model name: strip "gemini/" prefix.
    fn normalize_model(&self, model: &str) -> String {
        model
            .strip_prefix("gemini/")
            .unwrap_or(model)
            .to_string()
    }

    /// Convert messages to Gemini format.
    fn convert_messages(
        &self,
        messages: &[Message],
    ) -> (Option<serde_json::Value>, Vec<serde_json::Value>) {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(json!({
                        "parts": [{"text": msg.content}]
                    }));
                }
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": msg.content}]
                    }));
                }
                Role::Assistant => {
                    contents.push(json!({
                        "role": "model",
                        "parts": [{"text": msg.content}]
                    }));
                }
            }
        }

        (system_instruction, contents)
    }

    async fn generate_content(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<CompletionResponse, ProviderError> {
        let model_name = self.normalize_model(model);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, model_name, self.api_key
        );

        debug!("Gemini request with model {}", model_name);

        let response = http::client()
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_response(&data)
    }

    /// Speech-to-text using inline audio data.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        model: &str,
    ) -> Result<String, ProviderError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(audio);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": TRANSCRIBE_INSTRUCTION},
                    {"inlineData": {"mimeType": mime_type, "data": encoded}},
                ]
            }],
            "generationConfig": {"temperature": 0.0},
        });

        let resp = self.generate_content(model, body).await?;
        resp.content
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Parse("Empty transcript".to_string()))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError> {
        let (system_instruction, contents) = self.convert_messages(messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature": temperature,
            },
        });

        if let Some(system) = system_instruction {
            body["systemInstruction"] = system;
        }

        self.generate_content(model, body).await
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

fn parse_response(data: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
    let candidate = data
        .get("candidates")
        .and_then(|v| v.get(0))
        .ok_or_else(|| ProviderError::Parse("No candidates in response".to_string()))?;

    let finish_reason = match candidate.get("finishReason").and_then(|v| v.as_str()) {
        Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => FinishReason::Safety,
        _ => FinishReason::Stop,
    };

    // Blocked candidates come back without content
    let text_content: String = candidate
        .get("content")
        .and_then(|v| v.get("parts"))
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text_content.is_empty() && finish_reason != FinishReason::Safety {
        return Err(ProviderError::Parse("No parts in response".to_string()));
    }

    let usage = if let Some(u) = data.get("usageMetadata") {
        TokenUsage {
            prompt_tokens: u
                .get("promptTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            completion_tokens: u
                .get("candidatesTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: u
                .get("totalTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
        }
    } else {
        TokenUsage::default()
    };

    Ok(CompletionResponse {
        content: if text_content.is_empty() {
            None
        } else {
            Some(text_content)
        },
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_splits_system() {
        let p = GeminiProvider::new("k".to_string(), None, "gemini-2.0-flash".to_string());
        let (system, contents) = p.convert_messages(&[
            Message::system("be brief"),
            Message::user("hello"),
            Message::assistant("hi"),
        ]);
        assert_eq!(system.unwrap()["parts"][0]["text"], "be brief");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn test_parse_response_text_and_usage() {
        let data = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello "}, {"text": "world"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        });
        let resp = parse_response(&data).unwrap();
        assert_eq!(resp.content.as_deref(), Some("Hello world"));
        assert_eq!(resp.usage.total_tokens, 5);
    }

    #[test]
    fn test_parse_response_safety_block() {
        let data = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let resp = parse_response(&data).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Safety);
        assert!(resp.content.is_none());
    }

    #[test]
    fn test_parse_response_without_candidates() {
        assert!(parse_response(&json!({})).is_err());
    }

    #[test]
    fn test_normalize_model() {
        let p = GeminiProvider::new("k".to_string(), Some("http://x/".to_string()), "m".to_string());
        assert_eq!(p.normalize_model("gemini/gemini-2.0-flash"), "gemini-2.0-flash");
        assert_eq!(p.api_base, "http://x");
    }
}
