pub mod chat;
pub mod classify;
pub mod education;
pub mod messages;
pub mod prompts;
pub mod router;

use serde::Serialize;

use crate::types::Reply;

pub use chat::ChatController;
pub use classify::{classify, is_valid_email, looks_like_language, normalize, Intent};
pub use education::EducationController;
pub use router::Router;

/// What a turn did, for logs and the interaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    NeedsStart,
    AwaitInput,
    InvalidInput,
    Precondition,
    Ambiguous,
    Help,
    Generate,
    Regenerate,
    Translate,
    Mail,
    ChatTranslate,
    Busy,
    Discarded,
    Voice,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::NeedsStart => "needs_start",
            ActionKind::AwaitInput => "await_input",
            ActionKind::InvalidInput => "invalid_input",
            ActionKind::Precondition => "precondition",
            ActionKind::Ambiguous => "ambiguous",
            ActionKind::Help => "help",
            ActionKind::Generate => "generate",
            ActionKind::Regenerate => "regenerate",
            ActionKind::Translate => "translate",
            ActionKind::Mail => "mail",
            ActionKind::ChatTranslate => "chat_translate",
            ActionKind::Busy => "busy",
            ActionKind::Discarded => "discarded",
            ActionKind::Voice => "voice",
        }
    }

    /// Whether the action called the text-generation collaborator.
    pub fn used_generation(&self) -> bool {
        matches!(
            self,
            ActionKind::Generate | ActionKind::Regenerate | ActionKind::ChatTranslate
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborator call a controller needs before it can finish the turn.
///
/// Everything the call needs is captured here, so it can run without access
/// to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Generate { topic: String },
    Regenerate { instruction: String, original: String },
    Translate { content: String, language: String },
    Mail { recipient: String, subject: String, body: String },
    ChatPipeline { source: String, language: String },
}

impl Job {
    pub fn action(&self) -> ActionKind {
        match self {
            Job::Generate { .. } => ActionKind::Generate,
            Job::Regenerate { .. } => ActionKind::Regenerate,
            Job::Translate { .. } => ActionKind::Translate,
            Job::Mail { .. } => ActionKind::Mail,
            Job::ChatPipeline { .. } => ActionKind::ChatTranslate,
        }
    }
}

/// Result of a finished [`Job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Text(String),
    Delivered,
    Chat { plain_text: String, translated: String },
}

/// Outcome of feeding one intent to a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Done locally; the session may have been changed.
    Reply { reply: Reply, action: ActionKind },
    /// The session is unchanged until the job's output is applied.
    Call(Job),
}

impl Step {
    pub fn reply(reply: Reply, action: ActionKind) -> Self {
        Step::Reply { reply, action }
    }
}
