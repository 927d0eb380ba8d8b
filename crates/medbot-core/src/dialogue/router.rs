use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::collab::{Artifact, ArtifactKind, Collaborators, InteractionRecord};
use crate::config::{Config, InFlightPolicy, KeywordConfig};
use crate::error::{CollaboratorError, TurnError};
use crate::session::store::{SessionGuard, SessionSlot, SessionStore};
use crate::session::{Mode, Session};
use crate::types::Reply;

use super::classify::{classify, Intent};
use super::{messages, prompts, ActionKind, ChatController, EducationController, Job, JobOutput, Step};

/// Clears a slot's in-flight mark if the turn is dropped mid-call.
struct InFlightMark {
    slot: Option<Arc<Mutex<SessionSlot>>>,
    restore_mode: bool,
}

impl InFlightMark {
    fn new(slot: Arc<Mutex<SessionSlot>>) -> Self {
        Self {
            slot: Some(slot),
            restore_mode: false,
        }
    }

    /// Like `new`, but also clears a suspended mode if the call is dropped.
    fn suspended(slot: Arc<Mutex<SessionSlot>>) -> Self {
        Self {
            slot: Some(slot),
            restore_mode: true,
        }
    }

    fn disarm(&mut self) {
        self.slot = None;
    }
}

impl Drop for InFlightMark {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let restore_mode = self.restore_mode;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut guard = slot.lock().await;
                guard.in_flight = guard.in_flight.saturating_sub(1);
                if restore_mode {
                    guard.session.restore_mode();
                }
            });
        }
    }
}

/// Entry point for a user's message: picks the controller and runs the turn.
///
/// No lock is held while a collaborator runs. The session is worked on as a
/// clone and written back in one step.
#[derive(Clone)]
pub struct Router {
    store: Arc<SessionStore>,
    collab: Collaborators,
    education: EducationController,
    chat: ChatController,
    keywords: KeywordConfig,
    policy: InFlightPolicy,
    timeout: Duration,
}

impl Router {
    pub fn new(store: Arc<SessionStore>, collab: Collaborators, config: &Config) -> Self {
        let languages = config.dialogue.quick_languages.clone();
        Self {
            store,
            collab,
            education: EducationController::new(languages.clone()),
            chat: ChatController::new(languages),
            keywords: config.dialogue.keywords.clone(),
            policy: config.session.in_flight_policy,
            timeout: Duration::from_secs(config.dialogue.collaborator_timeout_secs),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn dispatch(&self, session: &mut Session, intent: Intent) -> Step {
        let target = match intent {
            Intent::Start(mode) => mode,
            _ => session.mode(),
        };
        match target {
            Mode::Chat => self.chat.step(session, intent),
            Mode::Education | Mode::None => self.education.step(session, intent),
        }
    }

    fn complete(&self, session: &mut Session, job: Job, output: JobOutput) -> Reply {
        match job {
            Job::ChatPipeline { .. } => self.chat.complete(session, job, output),
            _ => self.education.complete(session, job, output),
        }
    }

    /// Plain-language rewrite, then translation with a comprehension check.
    async fn chat_pipeline(
        &self,
        source: &str,
        language: &str,
    ) -> Result<JobOutput, CollaboratorError> {
        let plain_text = self
            .collab
            .generator
            .generate(&prompts::plain_language(source), prompts::PLAIN_LANGUAGE_SYSTEM)
            .await?;
        let translated = self
            .collab
            .generator
            .generate(
                &prompts::chat_translation(&plain_text, language),
                prompts::CHAT_TRANSLATE_SYSTEM,
            )
            .await?;
        Ok(JobOutput::Chat {
            plain_text,
            translated,
        })
    }

    /// Run a collaborator job under the turn timeout.
    async fn execute(&self, job: &Job) -> Result<JobOutput, CollaboratorError> {
        let secs = self.timeout.as_secs();
        let work = async {
            match job {
                Job::Generate { topic } => self
                    .collab
                    .generator
                    .generate(&prompts::leaflet(topic), prompts::EDUCATION_SYSTEM)
                    .await
                    .map(JobOutput::Text),
                Job::Regenerate { instruction, original } => self
                    .collab
                    .generator
                    .generate(&prompts::revision(instruction, original), prompts::EDUCATION_SYSTEM)
                    .await
                    .map(JobOutput::Text),
                Job::Translate { content, language } => self
                    .collab
                    .translator
                    .translate(content, language)
                    .await
                    .map(JobOutput::Text),
                Job::Mail { recipient, subject, body } => {
                    if self.collab.mailer.send(recipient, subject, body).await {
                        Ok(JobOutput::Delivered)
                    } else {
                        Err(CollaboratorError::Rejected(format!(
                            "mail to {recipient} was not accepted"
                        )))
                    }
                }
                Job::ChatPipeline { source, language } => self.chat_pipeline(source, language).await,
            }
        };

        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(secs)),
        }
    }

    /// Write the turn's session back into the slot.
    fn commit(&self, guard: &mut SessionGuard, mut session: Session) {
        self.store.enforce_size_bound(&mut session);
        session.touch();
        debug_assert!(
            session.invariant_violation().is_none(),
            "session invariant violated: {:?}",
            session.invariant_violation()
        );
        guard.session = session;
    }

    fn record(&self, session: &Session, input: &str, reply: &Reply, action: ActionKind) {
        self.collab.logger.log(InteractionRecord {
            timestamp: chrono::Utc::now(),
            user_id: session.user_id.clone(),
            input: input.to_string(),
            reply: reply.text.clone(),
            action,
            used_generation: action.used_generation(),
            session: session.clone(),
        });
    }

    fn store_artifacts(&self, session: &Session, job: &Job) {
        let artifact = match job {
            Job::Generate { .. } | Job::Regenerate { .. } => session
                .primary_content()
                .map(|c| (ArtifactKind::Leaflet, c.to_string())),
            Job::Translate { .. } => session
                .translated_content()
                .map(|c| (ArtifactKind::Translation, c.to_string())),
            Job::ChatPipeline { .. } => session
                .chat()
                .and_then(|c| c.last_exchange.as_ref())
                .map(|e| {
                    (
                        ArtifactKind::ChatExchange,
                        format!("{}\n\n{}\n\n{}", e.source, e.plain_text, e.translated),
                    )
                }),
            Job::Mail { .. } => None,
        };
        if let Some((kind, content)) = artifact {
            self.collab
                .logger
                .store_artifact(Artifact::new(&session.user_id, kind, content));
        }
    }

    /// Process one text message from `user_id`.
    pub async fn handle_turn(&self, user_id: &str, text: &str) -> Result<Reply, TurnError> {
        let mut guard = self.store.checkout(user_id).await?;
        let mut session = guard.session.clone();
        let intent = classify(text, &session, &self.keywords);
        debug!("Intent for {}: {:?}", user_id, intent);

        let is_start = matches!(intent, Intent::Start(_));
        if guard.in_flight > 0 && self.policy == InFlightPolicy::Reject && !is_start {
            warn!("Rejecting message from {}: previous request still running", user_id);
            let reply = messages::busy();
            self.record(&session, text, &reply, ActionKind::Busy);
            return Ok(reply);
        }

        let job = match self.dispatch(&mut session, intent) {
            Step::Reply { reply, action } => {
                if is_start {
                    // Outstanding calls from the previous activation must not land
                    guard.epoch += 1;
                }
                info!("Turn for {}: {}", user_id, action);
                self.commit(&mut guard, session);
                self.record(&guard.session, text, &reply, action);
                return Ok(reply);
            }
            Step::Call(job) => job,
        };

        let action = job.action();
        let epoch = guard.epoch;
        guard.in_flight += 1;
        let slot = OwnedMutexGuard::mutex(&guard).clone();
        drop(guard);

        let mut mark = InFlightMark::new(slot.clone());
        info!("Turn for {}: {} (calling collaborator)", user_id, action);
        let result = self.execute(&job).await;

        let mut guard = slot.lock_owned().await;
        guard.in_flight = guard.in_flight.saturating_sub(1);
        mark.disarm();

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                error!("Collaborator failed for {} during {}: {}", user_id, action, e);
                return Err(e.into());
            }
        };

        if guard.removed || guard.epoch != epoch {
            warn!("Discarding {} result for {}: session was reset", action, user_id);
            let reply = messages::discarded();
            self.record(&guard.session, text, &reply, ActionKind::Discarded);
            return Ok(reply);
        }

        let reply = self.complete(&mut session, job.clone(), output);
        self.commit(&mut guard, session);
        self.store_artifacts(&guard.session, &job);
        self.record(&guard.session, text, &reply, action);
        Ok(reply)
    }

    /// Transcribe a voice message, then handle the transcript as a text turn.
    pub async fn handle_voice(&self, user_id: &str, audio: &[u8]) -> Result<Reply, TurnError> {
        let Some(transcriber) = self.collab.transcriber.clone() else {
            return Ok(messages::voice_disabled());
        };

        let slot = {
            let mut guard = self.store.checkout(user_id).await?;
            if guard.in_flight > 0 && self.policy == InFlightPolicy::Reject {
                warn!("Rejecting voice message from {}: previous request still running", user_id);
                return Ok(messages::busy());
            }
            guard.session.suspend_mode();
            guard.in_flight += 1;
            OwnedMutexGuard::mutex(&guard).clone()
        };

        let mut mark = InFlightMark::suspended(slot.clone());
        let secs = self.timeout.as_secs();
        let result = match tokio::time::timeout(self.timeout, transcriber.transcribe(audio)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(secs)),
        };

        {
            let mut guard = slot.lock().await;
            guard.in_flight = guard.in_flight.saturating_sub(1);
            mark.disarm();
            if let Some(mode) = guard.session.restore_mode() {
                debug!("Restored {:?} mode for {} after transcription", mode, user_id);
            }
        }

        let transcript = result.map_err(|e| {
            error!("Transcription failed for {}: {}", user_id, e);
            TurnError::from(e)
        })?;
        info!("Turn for {}: {} ({} chars)", user_id, ActionKind::Voice, transcript.chars().count());

        let mut reply = self.handle_turn(user_id, &transcript).await?;
        reply.text = format!("🎤 {}\n\n{}", transcript, reply.text);
        Ok(reply)
    }
}
