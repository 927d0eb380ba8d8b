use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::collab::{Artifact, InteractionLogger, InteractionRecord};
use crate::config::StorageConfig;
use crate::util::safe_filename;

/// Work handed off the reply path.
#[derive(Debug, Clone)]
pub enum BackgroundTask {
    LogInteraction(InteractionRecord),
    StoreArtifact(Artifact),
}

/// Destination for interaction records.
#[async_trait]
pub trait InteractionSink: Send + Sync {
    async fn write(&self, record: &InteractionRecord) -> std::io::Result<()>;
}

/// Destination for generated artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(&self, artifact: &Artifact) -> std::io::Result<PathBuf>;
}

/// Appends one JSON object per line.
pub struct JsonlInteractionSink {
    path: PathBuf,
}

impl JsonlInteractionSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InteractionSink for JsonlInteractionSink {
    async fn write(&self, record: &InteractionRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Writes artifacts as text files under `<root>/<user>/`.
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactStore {
    async fn store(&self, artifact: &Artifact) -> std::io::Result<PathBuf> {
        let dir = self.root.join(safe_filename(&artifact.user_id));
        tokio::fs::create_dir_all(&dir).await?;
        let name = format!(
            "{}-{}-{}.txt",
            artifact.created_at.format("%Y%m%dT%H%M%S"),
            artifact.kind.as_str(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let path = dir.join(name);
        tokio::fs::write(&path, &artifact.content).await?;
        Ok(path)
    }
}

/// Producer half of the background queue. Cheap to clone; never blocks.
#[derive(Clone)]
pub struct QueuedLogger {
    tx: mpsc::Sender<BackgroundTask>,
}

impl QueuedLogger {
    fn enqueue(&self, task: BackgroundTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Background queue full, dropping task");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Background worker stopped, dropping task");
            }
        }
    }
}

impl InteractionLogger for QueuedLogger {
    fn log(&self, record: InteractionRecord) {
        self.enqueue(BackgroundTask::LogInteraction(record));
    }

    fn store_artifact(&self, artifact: Artifact) {
        self.enqueue(BackgroundTask::StoreArtifact(artifact));
    }
}

/// Consumer half: drains the queue into the sinks until every producer is gone.
pub struct BackgroundWorker {
    rx: mpsc::Receiver<BackgroundTask>,
    interactions: Box<dyn InteractionSink>,
    artifacts: Box<dyn ArtifactSink>,
}

impl BackgroundWorker {
    pub fn new(
        queue_size: usize,
        interactions: Box<dyn InteractionSink>,
        artifacts: Box<dyn ArtifactSink>,
    ) -> (QueuedLogger, Self) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (
            QueuedLogger { tx },
            Self {
                rx,
                interactions,
                artifacts,
            },
        )
    }

    /// Worker writing to the configured data files.
    pub fn from_config(config: &StorageConfig) -> (QueuedLogger, Self) {
        Self::new(
            config.queue_size,
            Box::new(JsonlInteractionSink::new(config.interaction_log_path())),
            Box::new(FileArtifactStore::new(config.artifacts_path())),
        )
    }

    pub async fn run(mut self) {
        info!("Background worker started");
        while let Some(task) = self.rx.recv().await {
            match task {
                BackgroundTask::LogInteraction(record) => {
                    if let Err(e) = self.interactions.write(&record).await {
                        error!("Failed to write interaction log for {}: {}", record.user_id, e);
                    }
                }
                BackgroundTask::StoreArtifact(artifact) => {
                    match self.artifacts.store(&artifact).await {
                        Ok(path) => debug!("Stored artifact {}", path.display()),
                        Err(e) => error!("Failed to store artifact for {}: {}", artifact.user_id, e),
                    }
                }
            }
        }
        info!("Background worker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::ArtifactKind;
    use crate::dialogue::ActionKind;
    use crate::session::Session;

    fn record(user: &str) -> InteractionRecord {
        InteractionRecord {
            timestamp: chrono::Utc::now(),
            user_id: user.to_string(),
            input: "new".to_string(),
            reply: "ok".to_string(),
            action: ActionKind::Start,
            used_generation: false,
            session: Session::new(user),
        }
    }

    #[tokio::test]
    async fn test_worker_drains_queue_into_files() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs/interactions.jsonl");
        let (logger, worker) = BackgroundWorker::new(
            8,
            Box::new(JsonlInteractionSink::new(&log_path)),
            Box::new(FileArtifactStore::new(dir.path().join("artifacts"))),
        );
        let handle = worker.spawn();

        logger.log(record("U1"));
        logger.log(record("U2"));
        logger.store_artifact(Artifact::new("U1", ArtifactKind::Leaflet, "CONTENT"));
        drop(logger);
        handle.await.unwrap();

        let text = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["userId"], "U1");
        assert_eq!(first["action"], "start");

        let user_dir = dir.path().join("artifacts/U1");
        let files: Vec<_> = std::fs::read_dir(&user_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "CONTENT");
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, worker) = BackgroundWorker::new(
            1,
            Box::new(JsonlInteractionSink::new(dir.path().join("log.jsonl"))),
            Box::new(FileArtifactStore::new(dir.path())),
        );
        // Worker not running yet: second send must not block
        logger.log(record("U1"));
        logger.log(record("U2"));
        drop(logger);
        worker.run().await;

        let text = std::fs::read_to_string(dir.path().join("log.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
