use serde::{Deserialize, Serialize};

/// Message role in a provider conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Reason the LLM stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Safety,
    Error,
}

/// A single message sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Payload of an inbound chat message.
#[derive(Debug, Clone)]
pub enum InboundContent {
    Text(String),
    Audio(Vec<u8>),
}

/// Message received from a chat channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub user_id: String,
    pub content: InboundContent,
    pub reply_token: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    pub fn text(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            content: InboundContent::Text(text.into()),
            reply_token: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn audio(channel: impl Into<String>, user_id: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            content: InboundContent::Audio(audio),
            reply_token: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_reply_token(mut self, token: impl Into<String>) -> Self {
        self.reply_token = Some(token.into());
        self
    }
}

/// What a dialogue turn sends back to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }

    pub fn with_quick_replies<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quick_replies = items.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_reply_serializes_camel_case() {
        let reply = Reply::text("hi").with_quick_replies(["modify", "translate"]);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["quickReplies"][1], "translate");

        let bare = serde_json::to_value(Reply::text("x")).unwrap();
        assert!(bare.get("quickReplies").is_none());
    }

    #[test]
    fn test_inbound_reply_token() {
        let msg = InboundMessage::text("line", "U1", "new").with_reply_token("tok");
        assert_eq!(msg.reply_token.as_deref(), Some("tok"));
        assert!(matches!(msg.content, InboundContent::Text(ref t) if t == "new"));
    }
}
