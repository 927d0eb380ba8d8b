//! Narrow interfaces to the external systems a dialogue turn depends on.

pub mod mail;
pub mod provider;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dialogue::ActionKind;
use crate::error::CollaboratorError;
use crate::session::Session;

pub use mail::{DisabledMailer, SmtpMailer};
pub use provider::{GeminiTranscriber, ProviderCollaborator};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str)
        -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns whether the message was handed off for delivery.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, CollaboratorError>;
}

/// One completed turn, as written to the interaction log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub input: String,
    pub reply: String,
    pub action: ActionKind,
    pub used_generation: bool,
    pub session: Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Leaflet,
    Translation,
    ChatExchange,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Leaflet => "leaflet",
            ArtifactKind::Translation => "translation",
            ArtifactKind::ChatExchange => "chat",
        }
    }
}

/// Generated output worth keeping outside the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub user_id: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(user_id: impl Into<String>, kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Fire-and-forget sink for completed turns. Must never block or fail the turn.
pub trait InteractionLogger: Send + Sync {
    fn log(&self, record: InteractionRecord);

    fn store_artifact(&self, _artifact: Artifact) {}
}

/// Everything the router calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub translator: Arc<dyn Translator>,
    pub mailer: Arc<dyn Mailer>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub logger: Arc<dyn InteractionLogger>,
}
