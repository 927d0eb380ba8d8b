/// Core error types for medbot.
#[derive(Debug, thiserror::Error)]
pub enum MedbotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No API key configured for provider")]
    NoApiKey,

    #[error("{0}")]
    Other(String),
}

/// Failure of an external collaborator (generation, translation, mail, transcription).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator call failed: {0}")]
    Failed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Collaborator rejected the request: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Timeout(_))
    }
}

impl From<ProviderError> for CollaboratorError {
    fn from(err: ProviderError) -> Self {
        CollaboratorError::Failed(err.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Session store exhausted: limit of {limit} sessions reached")]
    Exhausted { limit: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("{0}")]
    Other(String),
}

/// Errors that end a dialogue turn without a normal reply.
///
/// Input and precondition problems never show up here: they are answered with an
/// ordinary reply and leave the session untouched.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TurnError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TurnError::Collaborator(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, MedbotError>;
