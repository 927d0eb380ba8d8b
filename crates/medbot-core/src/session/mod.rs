pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which dialogue controller owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    None,
    Education,
    Chat,
}

/// The single follow-up input a session may be waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Awaiting {
    ModifyInstruction,
    TranslateTarget,
    RecipientEmail,
    ChatLanguage,
}

/// A translated snapshot of the leaflet it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub language: String,
    pub content: String,
}

/// Generated patient-education leaflet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaflet {
    pub topic: String,
    pub primary_content: String,
    pub translation: Option<Translation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationState {
    pub leaflet: Option<Leaflet>,
}

/// One processed chat-mode message, kept for artifact upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub source: String,
    pub plain_text: String,
    pub translated: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub target_language: Option<String>,
    pub last_exchange: Option<ChatExchange>,
}

/// Mode-specific state. Education fields do not exist in a chat session and
/// vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Flow {
    Idle,
    Education(EducationState),
    Chat(ChatState),
}

/// Per-user conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub started: bool,
    pub flow: Flow,
    pub awaiting: Option<Awaiting>,
    pub previous_mode: Option<Mode>,
    pub last_access: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            started: false,
            flow: Flow::Idle,
            awaiting: None,
            previous_mode: None,
            last_access: Utc::now(),
        }
    }

    /// Record activity so the idle sweep leaves this session alone.
    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    pub fn mode(&self) -> Mode {
        match self.flow {
            Flow::Idle => Mode::None,
            Flow::Education(_) => Mode::Education,
            Flow::Chat(_) => Mode::Chat,
        }
    }

    /// Start a fresh activation in `mode`, dropping all content and flags.
    pub fn activate(&mut self, mode: Mode) {
        self.flow = match mode {
            Mode::None => Flow::Idle,
            Mode::Education => Flow::Education(EducationState::default()),
            Mode::Chat => Flow::Chat(ChatState::default()),
        };
        self.started = mode != Mode::None;
        self.awaiting = None;
        self.previous_mode = None;
    }

    /// Back to the all-default state, keeping the user id.
    pub fn reset(&mut self) {
        self.activate(Mode::None);
    }

    pub fn education(&self) -> Option<&EducationState> {
        match &self.flow {
            Flow::Education(state) => Some(state),
            _ => None,
        }
    }

    pub fn education_mut(&mut self) -> Option<&mut EducationState> {
        match &mut self.flow {
            Flow::Education(state) => Some(state),
            _ => None,
        }
    }

    pub fn chat(&self) -> Option<&ChatState> {
        match &self.flow {
            Flow::Chat(state) => Some(state),
            _ => None,
        }
    }

    pub fn chat_mut(&mut self) -> Option<&mut ChatState> {
        match &mut self.flow {
            Flow::Chat(state) => Some(state),
            _ => None,
        }
    }

    pub fn leaflet(&self) -> Option<&Leaflet> {
        self.education().and_then(|e| e.leaflet.as_ref())
    }

    pub fn primary_content(&self) -> Option<&str> {
        self.leaflet().map(|l| l.primary_content.as_str())
    }

    pub fn translated_content(&self) -> Option<&str> {
        self.leaflet()
            .and_then(|l| l.translation.as_ref())
            .map(|t| t.content.as_str())
    }

    pub fn is_translated(&self) -> bool {
        self.translated_content().is_some()
    }

    pub fn last_topic(&self) -> Option<&str> {
        self.leaflet().map(|l| l.topic.as_str())
    }

    pub fn last_translation_language(&self) -> Option<&str> {
        self.leaflet()
            .and_then(|l| l.translation.as_ref())
            .map(|t| t.language.as_str())
    }

    pub fn chat_target_language(&self) -> Option<&str> {
        self.chat().and_then(|c| c.target_language.as_deref())
    }

    pub fn is_awaiting(&self, what: Awaiting) -> bool {
        self.awaiting == Some(what)
    }

    pub fn awaiting_modify_instruction(&self) -> bool {
        self.is_awaiting(Awaiting::ModifyInstruction)
    }

    pub fn awaiting_translate_target(&self) -> bool {
        self.is_awaiting(Awaiting::TranslateTarget)
    }

    pub fn awaiting_recipient_email(&self) -> bool {
        self.is_awaiting(Awaiting::RecipientEmail)
    }

    pub fn awaiting_chat_language(&self) -> bool {
        self.is_awaiting(Awaiting::ChatLanguage)
    }

    /// Whether a free-text message should be taken as new content to process.
    pub fn accepts_content(&self) -> bool {
        match &self.flow {
            Flow::Idle => false,
            Flow::Education(state) => state.leaflet.is_none(),
            Flow::Chat(state) => state.target_language.is_some(),
        }
    }

    /// Switch into an interrupting sub-flow, remembering the current mode.
    pub fn suspend_mode(&mut self) {
        self.previous_mode = Some(self.mode());
    }

    /// Leave the sub-flow. Returns the mode that was active before it.
    pub fn restore_mode(&mut self) -> Option<Mode> {
        self.previous_mode.take()
    }

    /// First violated structural invariant, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        match self.awaiting {
            Some(Awaiting::ModifyInstruction) => {
                if self.primary_content().is_none() {
                    return Some("modify instruction awaited without education content");
                }
            }
            Some(Awaiting::TranslateTarget) | Some(Awaiting::RecipientEmail) => {
                if self.primary_content().is_none() {
                    return Some("translate/mail follow-up awaited without education content");
                }
            }
            Some(Awaiting::ChatLanguage) => {
                if self.mode() != Mode::Chat {
                    return Some("chat language awaited outside chat mode");
                }
            }
            None => {}
        }
        if self.started != (self.mode() != Mode::None) {
            return Some("started flag disagrees with mode");
        }
        None
    }
}
