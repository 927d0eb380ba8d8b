use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::channel::{is_allowed, Channel};
use crate::config::LineConfig;
use crate::error::ChannelError;
use crate::dialogue::{messages, Router};
use crate::types::{InboundContent, InboundMessage, Reply};
use crate::util::http::client;

const LINE_REPLY_API: &str = "https://api.line.me/v2/bot/message/reply";
const LINE_PUSH_API: &str = "https://api.line.me/v2/bot/message/push";
const LINE_CONTENT_API: &str = "https://api-data.line.me/v2/bot/message";

/// LINE text message limit, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;
/// Messages allowed in one reply or push call.
pub const MAX_MESSAGES: usize = 5;
const MAX_QUICK_REPLIES: usize = 13;
const MAX_QUICK_REPLY_LABEL: usize = 20;

/// LINE Messaging API channel.
pub struct LineChannel {
    config: LineConfig,
    router: Router,
}

impl LineChannel {
    pub fn new(config: LineConfig, router: Router) -> Self {
        Self { config, router }
    }

    pub fn channel_secret(&self) -> &str {
        &self.config.channel_secret
    }

    /// Verify webhook signature using HMAC-SHA256.
    pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
        #[cfg(feature = "http-api")]
        {
            use hmac::{Hmac, Mac};
            use sha2::Sha256;

            type HmacSha256 = Hmac<Sha256>;

            let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
                return false;
            };
            mac.update(body);

            let expected = base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                mac.finalize().into_bytes(),
            );
            expected == signature
        }
        #[cfg(not(feature = "http-api"))]
        {
            let _ = (channel_secret, body, signature);
            false
        }
    }

    /// Parse LINE webhook events from the request body.
    pub fn parse_webhook_events(body: &str) -> Result<Vec<LineEvent>, serde_json::Error> {
        let webhook: LineWebhook = serde_json::from_str(body)?;
        Ok(webhook.events)
    }

    /// Split reply text into LINE-sized text messages and attach quick replies
    /// to the last one.
    pub fn build_messages(reply: &Reply) -> Vec<serde_json::Value> {
        let chunks = chunk_text(&reply.text, MAX_MESSAGE_CHARS, MAX_MESSAGES);
        let mut messages: Vec<serde_json::Value> = chunks
            .into_iter()
            .map(|text| json!({"type": "text", "text": text}))
            .collect();

        if !reply.quick_replies.is_empty() {
            let items: Vec<serde_json::Value> = reply
                .quick_replies
                .iter()
                .take(MAX_QUICK_REPLIES)
                .map(|label| {
                    let shown: String = label.chars().take(MAX_QUICK_REPLY_LABEL).collect();
                    json!({
                        "type": "action",
                        "action": {"type": "message", "label": shown, "text": label}
                    })
                })
                .collect();
            if let Some(last) = messages.last_mut() {
                last["quickReply"] = json!({"items": items});
            }
        }
        messages
    }

    async fn post(access_token: &str, url: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let resp = client()
            .post(url)
            .header("Authorization", format!("Bearer {access_token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!("LINE API error: {} {}", status, text);
            return Err(api_error(status, &text));
        }
        Ok(())
    }

    /// Reply to a LINE message using the reply token.
    /// Must be called within 1 minute of receiving the webhook.
    pub async fn reply(
        access_token: &str,
        reply_token: &str,
        reply: &Reply,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "replyToken": reply_token,
            "messages": Self::build_messages(reply),
        });
        Self::post(access_token, LINE_REPLY_API, body).await?;
        debug!("LINE reply sent successfully");
        Ok(())
    }

    /// Push a message to a LINE user (no reply token needed).
    pub async fn push_message(access_token: &str, to: &str, reply: &Reply) -> Result<(), ChannelError> {
        let body = json!({
            "to": to,
            "messages": Self::build_messages(reply),
        });
        Self::post(access_token, LINE_PUSH_API, body).await?;
        debug!("LINE push message sent to {}", to);
        Ok(())
    }

    /// Download the binary content of an audio message.
    pub async fn fetch_content(access_token: &str, message_id: &str) -> Result<Vec<u8>, ChannelError> {
        let url = format!("{LINE_CONTENT_API}/{message_id}/content");
        let resp = client()
            .get(&url)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error(status, &text));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChannelError::Other(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Turn a webhook event into an inbound message, if it carries one we handle.
    pub async fn to_inbound(&self, event: &LineEvent) -> Option<InboundMessage> {
        if event.event_type != "message" {
            debug!("Ignoring LINE event type: {}", event.event_type);
            return None;
        }
        let message = event.message.as_ref()?;
        let sender_id = event.source.as_ref().and_then(|s| s.user_id.as_deref())?;

        if !is_allowed(sender_id, &self.config.allow_from) {
            warn!("LINE message from unauthorized user: {}", sender_id);
            return None;
        }

        let inbound = match message.msg_type.as_str() {
            "text" => {
                let text = message.text.as_deref().unwrap_or("");
                InboundMessage::text("line", sender_id, text)
            }
            "audio" => {
                let id = message.id.as_deref()?;
                match Self::fetch_content(&self.config.channel_access_token, id).await {
                    Ok(audio) => InboundMessage::audio("line", sender_id, audio),
                    Err(e) => {
                        error!("Failed to download LINE audio {}: {}", id, e);
                        return None;
                    }
                }
            }
            other => {
                debug!("Ignoring LINE {} message", other);
                return None;
            }
        };

        Some(match &event.reply_token {
            Some(token) => inbound.with_reply_token(token),
            None => inbound,
        })
    }

    /// Run the dialogue for one inbound message. Errors become a user-facing reply.
    pub async fn respond(&self, msg: &InboundMessage) -> Reply {
        let result = match &msg.content {
            InboundContent::Text(text) => {
                info!("LINE message from {}: {}", msg.user_id, text);
                self.router.handle_turn(&msg.user_id, text).await
            }
            InboundContent::Audio(audio) => {
                info!("LINE audio from {} ({} bytes)", msg.user_id, audio.len());
                self.router.handle_voice(&msg.user_id, audio).await
            }
        };
        result.unwrap_or_else(|e| messages::for_error(&e))
    }

    /// Handle one webhook event end to end: dialogue turn, then reply.
    pub async fn process_event(&self, event: &LineEvent) {
        match event.event_type.as_str() {
            "follow" => {
                info!("LINE follow event");
                if let Some(token) = &event.reply_token {
                    let welcome = messages::needs_start();
                    if let Err(e) =
                        Self::reply(&self.config.channel_access_token, token, &welcome).await
                    {
                        warn!("Failed to send welcome message: {}", e);
                    }
                }
                return;
            }
            "unfollow" => {
                info!("LINE unfollow event");
                return;
            }
            _ => {}
        }

        let Some(msg) = self.to_inbound(event).await else {
            return;
        };
        let reply = self.respond(&msg).await;
        self.deliver(&msg, &reply).await;
    }

    /// Reply with the token when we have one; fall back to a push when the
    /// token was missing or has expired.
    async fn deliver(&self, msg: &InboundMessage, reply: &Reply) {
        let token = &self.config.channel_access_token;
        if let Some(reply_token) = &msg.reply_token {
            match Self::reply(token, reply_token, reply).await {
                Ok(()) => return,
                Err(e) => warn!("LINE reply failed, falling back to push: {}", e),
            }
        }
        if let Err(e) = self.send(&msg.user_id, reply).await {
            error!("Failed to deliver reply to {}: {}", msg.user_id, e);
        }
    }
}

#[async_trait]
impl Channel for LineChannel {
    fn name(&self) -> &str {
        "line"
    }

    async fn send(&self, user_id: &str, reply: &Reply) -> Result<(), ChannelError> {
        Self::push_message(&self.config.channel_access_token, user_id, reply).await
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> ChannelError {
    match status.as_u16() {
        401 | 403 => ChannelError::Auth(format!("LINE rejected the access token ({status})")),
        _ => ChannelError::Send(format!("LINE API error {status}: {body}")),
    }
}

/// Split `text` into at most `max_parts` pieces of at most `max_chars`
/// characters, preferring line breaks. Overflow goes into the last piece,
/// which is then cut with an ellipsis.
pub fn chunk_text(text: &str, max_chars: usize, max_parts: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest: &str = text;
    while !rest.is_empty() && parts.len() + 1 < max_parts {
        if rest.chars().count() <= max_chars {
            break;
        }
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = rest[..hard_end]
            .rfind('\n')
            .filter(|&i| i > 0)
            .unwrap_or(hard_end);
        parts.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches('\n');
    }

    if !rest.is_empty() {
        if rest.chars().count() > max_chars {
            let kept: String = rest.chars().take(max_chars.saturating_sub(1)).collect();
            parts.push(format!("{kept}…"));
        } else {
            parts.push(rest.to_string());
        }
    }
    parts
}

// ====== LINE Webhook Types ======

#[derive(Debug, Deserialize)]
pub struct LineWebhook {
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reply_token: Option<String>,
    pub source: Option<LineSource>,
    pub message: Option<LineMessage>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMessage {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub text: Option<String>,
    pub duration: Option<u64>,
}
