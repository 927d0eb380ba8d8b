#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use medbot_core::collab::{
    Collaborators, InteractionLogger, InteractionRecord, Mailer, TextGenerator, Transcriber,
    Translator,
};
use medbot_core::config::Config;
use medbot_core::dialogue::Router;
use medbot_core::error::CollaboratorError;
use medbot_core::session::store::SessionStore;
use medbot_core::session::Session;

/// Generator that replays scripted answers and remembers every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    pub calls: Mutex<Vec<(String, String)>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn answering(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| Ok(a.to_string())).collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, answer: Result<String, CollaboratorError>) {
        self.answers.lock().unwrap().push_back(answer);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), system_instruction.to_string()));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("GENERATED".to_string()))
    }
}

#[derive(Default)]
pub struct MockTranslator {
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), target_language.to_string()));
        Ok(format!("[{target_language}] {text}"))
    }
}

pub struct MockMailer {
    pub accept: bool,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl Default for MockMailer {
    fn default() -> Self {
        Self {
            accept: true,
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MockMailer {
    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(r, _, _)| r.clone()).collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string(), body.to_string()));
        self.accept
    }
}

pub struct MockTranscriber {
    pub transcript: String,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, CollaboratorError> {
        if audio.is_empty() {
            return Err(CollaboratorError::Rejected("empty audio".to_string()));
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.transcript.clone())
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub records: Mutex<Vec<InteractionRecord>>,
}

impl RecordingLogger {
    pub fn actions(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.action.to_string())
            .collect()
    }
}

impl InteractionLogger for RecordingLogger {
    fn log(&self, record: InteractionRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// A router wired to mock collaborators, plus handles on the mocks.
pub struct Harness {
    pub router: Router,
    pub store: Arc<SessionStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub translator: Arc<MockTranslator>,
    pub mailer: Arc<MockMailer>,
    pub logger: Arc<RecordingLogger>,
    pub gate: Arc<Semaphore>,
}

pub struct HarnessBuilder {
    config: Config,
    answers: Vec<String>,
    gated: bool,
    delay: Option<Duration>,
    mail_accepts: bool,
    transcript: Option<String>,
}

impl HarnessBuilder {
    pub fn answers(mut self, answers: &[&str]) -> Self {
        self.answers = answers.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Generator and transcriber calls block until `gate.add_permits` is called.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn mail_rejects(mut self) -> Self {
        self.mail_accepts = false;
        self
    }

    pub fn transcript(mut self, text: &str) -> Self {
        self.transcript = Some(text.to_string());
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Harness {
        let gate = Arc::new(Semaphore::new(0));
        let answers: Vec<&str> = self.answers.iter().map(String::as_str).collect();
        let mut generator = ScriptedGenerator::answering(&answers);
        if self.gated {
            generator.gate = Some(gate.clone());
        }
        generator.delay = self.delay;
        let generator = Arc::new(generator);
        let translator = Arc::new(MockTranslator::default());
        let mailer = Arc::new(MockMailer {
            accept: self.mail_accepts,
            ..MockMailer::default()
        });
        let logger = Arc::new(RecordingLogger::default());
        let store = Arc::new(SessionStore::new(&self.config.session));

        let collab = Collaborators {
            generator: generator.clone(),
            translator: translator.clone(),
            mailer: mailer.clone(),
            transcriber: self.transcript.map(|transcript| {
                Arc::new(MockTranscriber {
                    transcript,
                    gate: self.gated.then(|| gate.clone()),
                }) as Arc<dyn Transcriber>
            }),
            logger: logger.clone(),
        };
        let router = Router::new(store.clone(), collab, &self.config);

        Harness {
            router,
            store,
            generator,
            translator,
            mailer,
            logger,
            gate,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: Config::default(),
            answers: Vec::new(),
            gated: false,
            delay: None,
            mail_accepts: true,
            transcript: None,
        }
    }

    pub fn with_answers(answers: &[&str]) -> Self {
        Self::builder().answers(answers).build()
    }

    /// Run a turn that is expected to succeed and return the reply text.
    pub async fn say(&self, user: &str, text: &str) -> String {
        self.router
            .handle_turn(user, text)
            .await
            .unwrap_or_else(|e| panic!("turn {text:?} failed: {e}"))
            .text
    }

    pub async fn session(&self, user: &str) -> Session {
        self.store.get(user).await.expect("session exists")
    }

    /// Wait until `user` has a collaborator call running.
    pub async fn wait_in_flight(&self, user: &str) {
        for _ in 0..1000 {
            {
                let guard = self.store.checkout(user).await.unwrap();
                if guard.in_flight > 0 {
                    return;
                }
            }
            tokio::task::yield_now().await;
        }
        panic!("no call became in-flight for {user}");
    }
}
