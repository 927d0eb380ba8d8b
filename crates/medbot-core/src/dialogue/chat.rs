use tracing::debug;

use crate::session::{Awaiting, ChatExchange, Mode, Session};
use crate::types::Reply;

use super::classify::{looks_like_language, normalize, Intent};
use super::{messages, ActionKind, Job, JobOutput, Step};

/// Real-time translation flow: pick a target language once, then every
/// message is rewritten in plain language and translated.
#[derive(Debug, Clone)]
pub struct ChatController {
    quick_languages: Vec<String>,
}

impl ChatController {
    pub fn new(quick_languages: Vec<String>) -> Self {
        Self { quick_languages }
    }

    /// Accepts either a quick-pick label or anything that looks like a language name.
    fn accept_language(&self, text: &str) -> Option<String> {
        let normalized = normalize(text);
        if let Some(label) = self
            .quick_languages
            .iter()
            .find(|label| normalize(label) == normalized)
        {
            return Some(label.clone());
        }
        looks_like_language(text).then(|| text.trim().to_string())
    }

    fn prompt_language(&self, session: &mut Session) -> Reply {
        session.awaiting = Some(Awaiting::ChatLanguage);
        messages::ask_chat_language(&self.quick_languages)
    }

    pub fn step(&self, session: &mut Session, intent: Intent) -> Step {
        if let Intent::Start(_) = intent {
            session.activate(Mode::Chat);
            debug!("Chat flow started for {}", session.user_id);
            return Step::reply(self.prompt_language(session), ActionKind::Start);
        }

        // Entry rule: no language and no open prompt means we ask, whatever was typed.
        if session.chat_target_language().is_none() && !session.awaiting_chat_language() {
            return Step::reply(self.prompt_language(session), ActionKind::AwaitInput);
        }

        match intent {
            Intent::LanguageSupply(text) => match self.accept_language(&text) {
                Some(language) => {
                    if let Some(state) = session.chat_mut() {
                        state.target_language = Some(language.clone());
                    }
                    session.awaiting = None;
                    session.started = true;
                    debug!("Chat language for {} set to {}", session.user_id, language);
                    Step::reply(messages::chat_ready(&language), ActionKind::Start)
                }
                None => Step::reply(
                    messages::unknown_language(&self.quick_languages),
                    ActionKind::InvalidInput,
                ),
            },
            Intent::ContentRequest(source) => match session.chat_target_language() {
                Some(language) => Step::Call(Job::ChatPipeline {
                    source,
                    language: language.to_string(),
                }),
                None => Step::reply(self.prompt_language(session), ActionKind::AwaitInput),
            },
            Intent::Modify | Intent::Translate | Intent::Mail => {
                let language = session.chat_target_language().unwrap_or_default().to_string();
                Step::reply(messages::chat_hint(&language), ActionKind::Precondition)
            }
            Intent::AmbiguousMultiCommand => {
                Step::reply(messages::ambiguous(), ActionKind::Ambiguous)
            }
            Intent::NeedsStart => Step::reply(messages::needs_start(), ActionKind::NeedsStart),
            Intent::Start(_)
            | Intent::ModifyInstruction(_)
            | Intent::EmailSupply(_)
            | Intent::Unrecognized => Step::reply(messages::help(), ActionKind::Help),
        }
    }

    /// Store the processed exchange and show both texts.
    pub fn complete(&self, session: &mut Session, job: Job, output: JobOutput) -> Reply {
        let (Job::ChatPipeline { source, .. }, JobOutput::Chat { plain_text, translated }) =
            (job, output)
        else {
            return messages::help();
        };
        let reply = messages::chat_result(&plain_text, &translated);
        if let Some(state) = session.chat_mut() {
            state.last_exchange = Some(ChatExchange {
                source,
                plain_text,
                translated,
            });
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ChatController {
        ChatController::new(vec![
            "中文".to_string(),
            "English".to_string(),
            "Tiếng Việt".to_string(),
        ])
    }

    #[test]
    fn test_start_prompts_for_language() {
        let c = controller();
        let mut s = Session::new("U1");
        let step = c.step(&mut s, Intent::Start(Mode::Chat));
        let Step::Reply { reply, action } = step else {
            panic!("expected a reply");
        };
        assert_eq!(action, ActionKind::Start);
        assert_eq!(reply.quick_replies.len(), 3);
        assert!(s.started);
        assert_eq!(s.mode(), Mode::Chat);
        assert!(s.awaiting_chat_language());
    }

    #[test]
    fn test_entry_rule_ignores_input() {
        let c = controller();
        let mut s = Session::new("U1");
        s.activate(Mode::Chat);
        let step = c.step(&mut s, Intent::Unrecognized);
        assert!(matches!(step, Step::Reply { action: ActionKind::AwaitInput, .. }));
        assert!(s.awaiting_chat_language());
    }

    #[test]
    fn test_language_accepted_and_rejected() {
        let c = controller();
        let mut s = Session::new("U1");
        c.step(&mut s, Intent::Start(Mode::Chat));

        let step = c.step(&mut s, Intent::LanguageSupply("please use english".to_string()));
        assert!(matches!(step, Step::Reply { action: ActionKind::InvalidInput, .. }));
        assert!(s.awaiting_chat_language());

        c.step(&mut s, Intent::LanguageSupply("日本語".to_string()));
        assert_eq!(s.chat_target_language(), Some("日本語"));
        assert!(s.awaiting.is_none());
        assert!(s.invariant_violation().is_none());
    }

    #[test]
    fn test_quick_pick_label_with_space_is_accepted() {
        let c = controller();
        let mut s = Session::new("U1");
        c.step(&mut s, Intent::Start(Mode::Chat));
        c.step(&mut s, Intent::LanguageSupply("tiếng việt".to_string()));
        assert_eq!(s.chat_target_language(), Some("Tiếng Việt"));
    }

    #[test]
    fn test_active_content_runs_pipeline() {
        let c = controller();
        let mut s = Session::new("U1");
        c.step(&mut s, Intent::Start(Mode::Chat));
        c.step(&mut s, Intent::LanguageSupply("English".to_string()));

        let Step::Call(job) = c.step(&mut s, Intent::ContentRequest("按時吃藥".to_string())) else {
            panic!("expected a pipeline job");
        };
        assert_eq!(
            job,
            Job::ChatPipeline {
                source: "按時吃藥".to_string(),
                language: "English".to_string()
            }
        );
        let reply = c.complete(
            &mut s,
            job,
            JobOutput::Chat {
                plain_text: "PLAIN".to_string(),
                translated: "TRANSLATED".to_string(),
            },
        );
        assert!(reply.text.contains("PLAIN"));
        assert!(reply.text.contains("TRANSLATED"));
        let exchange = s.chat().unwrap().last_exchange.as_ref().unwrap();
        assert_eq!(exchange.source, "按時吃藥");
        // Language persists across turns
        assert_eq!(s.chat_target_language(), Some("English"));
    }

    #[test]
    fn test_education_commands_get_hint() {
        let c = controller();
        let mut s = Session::new("U1");
        c.step(&mut s, Intent::Start(Mode::Chat));
        c.step(&mut s, Intent::LanguageSupply("English".to_string()));
        let step = c.step(&mut s, Intent::Modify);
        assert!(matches!(step, Step::Reply { action: ActionKind::Precondition, .. }));
        assert_eq!(s.mode(), Mode::Chat);
    }
}
