use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration for medbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub providers: ProvidersConfig,
    pub line: LineConfig,
    pub session: SessionConfig,
    pub dialogue: DialogueConfig,
    pub mail: MailConfig,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Match a provider based on model name.
    fn match_provider(&self, model: Option<&str>) -> Option<&ProviderConfig> {
        let model = model.unwrap_or(&self.generation.model).to_lowercase();

        let providers: &[(&[&str], &ProviderConfig)] = &[
            (&["gemini", "google"], &self.providers.gemini),
            (&["openai", "gpt"], &self.providers.openai),
        ];

        for (keywords, provider) in providers {
            for keyword in *keywords {
                if model.contains(keyword) && !provider.api_key.is_empty() {
                    return Some(provider);
                }
            }
        }
        None
    }

    /// Get API key for the given model (or default model).
    /// Falls back to first available key.
    pub fn get_api_key(&self, model: Option<&str>) -> Option<&str> {
        if let Some(p) = self.match_provider(model) {
            return Some(&p.api_key);
        }
        [&self.providers.gemini, &self.providers.openai]
            .into_iter()
            .find(|p| !p.api_key.is_empty())
            .map(|p| p.api_key.as_str())
    }

    /// Get API base URL override for the given model.
    pub fn get_api_base(&self, model: Option<&str>) -> Option<&str> {
        self.match_provider(model)
            .and_then(|p| p.api_base.as_deref())
    }

    /// Whether enough is configured to send mail.
    pub fn mail_enabled(&self) -> bool {
        self.mail.enabled && !self.mail.smtp_host.is_empty() && !self.mail.from.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_tokens: 4096,
            temperature: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct ProvidersConfig {
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct LineConfig {
    pub enabled: bool,
    pub channel_secret: String,
    pub channel_access_token: String,
    pub allow_from: Vec<String>,
}

/// What happens when a user sends another message while a collaborator call
/// for the same user is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[derive(Default)]
pub enum InFlightPolicy {
    /// Answer with a busy message and leave the session alone.
    #[default]
    Reject,
    /// Let both turns run; whichever finishes last owns the final state.
    LastWriteWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub max_idle_secs: u64,
    pub sweep_interval_secs: u64,
    /// Per-field byte ceiling before text is truncated with a marker.
    pub max_field_bytes: usize,
    pub max_sessions: usize,
    pub in_flight_policy: InFlightPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: 60 * 60,
            sweep_interval_secs: 5 * 60,
            max_field_bytes: 16 * 1024,
            max_sessions: 100_000,
            in_flight_policy: InFlightPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueConfig {
    pub collaborator_timeout_secs: u64,
    pub keywords: KeywordConfig,
    /// Quick-pick labels offered when asking for a chat target language.
    pub quick_languages: Vec<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_secs: 50,
            keywords: KeywordConfig::default(),
            quick_languages: [
                "中文",
                "English",
                "日本語",
                "Tiếng Việt",
                "Indonesia",
                "ไทย",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Exact-match command vocabularies. Latin entries are compared case-folded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordConfig {
    pub start: BTreeSet<String>,
    pub chat: BTreeSet<String>,
    pub modify: BTreeSet<String>,
    pub translate: BTreeSet<String>,
    pub mail: BTreeSet<String>,
}

fn set(words: &[&str]) -> BTreeSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            start: set(&["new", "開始", "新對話"]),
            chat: set(&["chat", "聊天", "即時翻譯"]),
            modify: set(&["modify", "修改"]),
            translate: set(&["translate", "翻譯"]),
            mail: set(&["mail", "寄送", "email"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// JSONL interaction log; defaults to `~/.medbot/interactions.jsonl`.
    pub interaction_log: Option<String>,
    /// Artifact directory; defaults to `~/.medbot/artifacts`.
    pub artifacts_dir: Option<String>,
    pub queue_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            interaction_log: None,
            artifacts_dir: None,
            queue_size: 1024,
        }
    }
}

impl StorageConfig {
    pub fn interaction_log_path(&self) -> PathBuf {
        self.interaction_log
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("interactions.jsonl"))
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.artifacts_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("artifacts"))
    }
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `MEDBOT_CONFIG` env var: full JSON config
/// 2. Individual env vars (merged on top of the file config)
/// 3. File fallback (`~/.medbot/config.json`)
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("MEDBOT_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse MEDBOT_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);

    // Provider keys
    if let Ok(v) = std::env::var("GEMINI_API_KEY") {
        cfg.providers.gemini.api_key = v;
    }
    if let Ok(v) = std::env::var("OPENAI_API_KEY") {
        cfg.providers.openai.api_key = v;
    }
    if let Ok(v) = std::env::var("MEDBOT_MODEL") {
        cfg.generation.model = v;
    }

    // LINE
    if let Ok(v) = std::env::var("LINE_CHANNEL_SECRET") {
        cfg.line.channel_secret = v;
    }
    if let Ok(v) = std::env::var("LINE_CHANNEL_ACCESS_TOKEN") {
        cfg.line.channel_access_token = v;
        cfg.line.enabled = true;
    }
    if let Ok(v) = std::env::var("LINE_ALLOW_FROM") {
        cfg.line.allow_from = split_list(&v);
    }

    // SMTP
    if let Ok(v) = std::env::var("SMTP_HOST") {
        cfg.mail.smtp_host = v;
        cfg.mail.enabled = true;
    }
    if let Ok(v) = std::env::var("SMTP_PORT") {
        match v.parse() {
            Ok(port) => cfg.mail.smtp_port = port,
            Err(_) => tracing::warn!("Ignoring invalid SMTP_PORT: {}", v),
        }
    }
    if let Ok(v) = std::env::var("SMTP_USERNAME") {
        cfg.mail.username = v;
    }
    if let Ok(v) = std::env::var("SMTP_PASSWORD") {
        cfg.mail.password = v;
    }
    if let Ok(v) = std::env::var("MAIL_FROM") {
        cfg.mail.from = v;
    }

    // Session
    if let Ok(v) = std::env::var("MEDBOT_SESSION_MAX_IDLE_SECS") {
        match v.parse() {
            Ok(secs) => cfg.session.max_idle_secs = secs,
            Err(_) => tracing::warn!("Ignoring invalid MEDBOT_SESSION_MAX_IDLE_SECS: {}", v),
        }
    }

    cfg
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the medbot data directory.
pub fn get_data_dir() -> PathBuf {
    let path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medbot");
    std::fs::create_dir_all(&path).ok();
    path
}

/// Load configuration from file or create default.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> std::result::Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
