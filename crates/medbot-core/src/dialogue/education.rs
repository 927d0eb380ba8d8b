use tracing::debug;

use crate::session::{Awaiting, Leaflet, Mode, Session, Translation};
use crate::types::Reply;

use super::classify::{is_valid_email, Intent};
use super::{messages, ActionKind, Job, JobOutput, Step};

/// Drives the generate → modify → translate → mail leaflet flow.
#[derive(Debug, Clone)]
pub struct EducationController {
    quick_languages: Vec<String>,
}

impl EducationController {
    pub fn new(quick_languages: Vec<String>) -> Self {
        Self { quick_languages }
    }

    pub fn step(&self, session: &mut Session, intent: Intent) -> Step {
        match intent {
            Intent::Start(_) => {
                session.activate(Mode::Education);
                debug!("Education flow started for {}", session.user_id);
                Step::reply(messages::education_started(), ActionKind::Start)
            }
            Intent::NeedsStart => Step::reply(messages::needs_start(), ActionKind::NeedsStart),
            Intent::AmbiguousMultiCommand => {
                Step::reply(messages::ambiguous(), ActionKind::Ambiguous)
            }
            Intent::Unrecognized => Step::reply(messages::help(), ActionKind::Help),

            Intent::ContentRequest(topic) => {
                if session.primary_content().is_some() {
                    return Step::reply(messages::help(), ActionKind::Help);
                }
                Step::Call(Job::Generate { topic })
            }

            Intent::Modify => match session.leaflet() {
                None => Step::reply(messages::nothing_to_modify(), ActionKind::Precondition),
                Some(leaflet) if leaflet.translation.is_some() => {
                    Step::reply(messages::modify_locked(), ActionKind::Precondition)
                }
                Some(_) => {
                    session.awaiting = Some(Awaiting::ModifyInstruction);
                    Step::reply(messages::ask_modify_instruction(), ActionKind::AwaitInput)
                }
            },
            Intent::ModifyInstruction(instruction) => {
                let Some(original) = session.primary_content() else {
                    session.awaiting = None;
                    return Step::reply(messages::nothing_to_modify(), ActionKind::Precondition);
                };
                if instruction.is_empty() {
                    return Step::reply(messages::ask_modify_instruction(), ActionKind::InvalidInput);
                }
                Step::Call(Job::Regenerate {
                    instruction,
                    original: original.to_string(),
                })
            }

            Intent::Translate => {
                if session.primary_content().is_none() {
                    return Step::reply(messages::generate_first(), ActionKind::Precondition);
                }
                session.awaiting = Some(Awaiting::TranslateTarget);
                Step::reply(
                    messages::ask_translate_target(&self.quick_languages),
                    ActionKind::AwaitInput,
                )
            }
            Intent::LanguageSupply(language) => {
                let Some(content) = session.primary_content() else {
                    session.awaiting = None;
                    return Step::reply(messages::generate_first(), ActionKind::Precondition);
                };
                if language.is_empty() {
                    return Step::reply(
                        messages::ask_translate_target(&self.quick_languages),
                        ActionKind::InvalidInput,
                    );
                }
                Step::Call(Job::Translate {
                    content: content.to_string(),
                    language,
                })
            }

            Intent::Mail => {
                if session.primary_content().is_none() {
                    return Step::reply(messages::generate_first(), ActionKind::Precondition);
                }
                session.awaiting = Some(Awaiting::RecipientEmail);
                Step::reply(messages::ask_recipient(), ActionKind::AwaitInput)
            }
            Intent::EmailSupply(recipient) => {
                let Some(leaflet) = session.leaflet() else {
                    session.awaiting = None;
                    return Step::reply(messages::generate_first(), ActionKind::Precondition);
                };
                if !is_valid_email(&recipient) {
                    return Step::reply(messages::invalid_email(), ActionKind::InvalidInput);
                }
                let translation = leaflet
                    .translation
                    .as_ref()
                    .map(|t| (t.language.as_str(), t.content.as_str()));
                Step::Call(Job::Mail {
                    subject: messages::mail_subject(&leaflet.topic),
                    body: messages::mail_body(&leaflet.primary_content, translation),
                    recipient,
                })
            }
        }
    }

    /// Apply a finished job to the session and build the reply.
    pub fn complete(&self, session: &mut Session, job: Job, output: JobOutput) -> Reply {
        let text = match output {
            JobOutput::Text(text) => text,
            JobOutput::Delivered => String::new(),
            JobOutput::Chat { translated, .. } => translated,
        };

        match job {
            Job::Generate { topic } => {
                if let Some(state) = session.education_mut() {
                    state.leaflet = Some(Leaflet {
                        topic,
                        primary_content: text.clone(),
                        translation: None,
                    });
                }
                session.awaiting = None;
                messages::generated(&text)
            }
            Job::Regenerate { .. } => {
                if let Some(leaflet) = session.education_mut().and_then(|e| e.leaflet.as_mut()) {
                    leaflet.primary_content = text.clone();
                }
                session.awaiting = None;
                messages::generated(&text)
            }
            Job::Translate { language, .. } => {
                if let Some(leaflet) = session.education_mut().and_then(|e| e.leaflet.as_mut()) {
                    leaflet.translation = Some(Translation {
                        language: language.clone(),
                        content: text.clone(),
                    });
                }
                session.awaiting = None;
                messages::translated(&language, &text)
            }
            Job::Mail { recipient, .. } => {
                session.awaiting = None;
                messages::mailed(&recipient)
            }
            Job::ChatPipeline { .. } => messages::help(),
        }
    }
}
