//! Configuration management for Voice Journal
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, JournalError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data backend (hosted or local)
    #[serde(default)]
    pub backend: BackendConfig,
    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Chat completion and transcription API
    #[serde(default)]
    pub ai: AiConfig,
    /// Text-to-speech API
    #[serde(default)]
    pub speech: SpeechConfig,
    /// Journaling behavior
    #[serde(default)]
    pub journal: JournalConfig,
    /// Recording and playback commands
    #[serde(default)]
    pub device: DeviceConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which data backend to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hosted auth + REST + realtime service
    Supabase,
    /// Local SQLite database
    #[default]
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = JournalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supabase" | "hosted" => Ok(Self::Supabase),
            "local" | "sqlite" => Ok(Self::Local),
            other => Err(JournalError::Config(format!(
                "Invalid backend: {}. Must be one of: supabase, local",
                other
            ))),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type
    #[serde(default, rename = "type")]
    pub kind: BackendKind,

    /// Project URL of the hosted service (e.g. `https://abc.supabase.co`)
    #[serde(default)]
    pub url: Option<String>,

    /// Public anonymous key of the hosted service
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Local database path; defaults to the user data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Identity used for local journaling
    #[serde(default)]
    pub local_user: LocalUserConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: None,
            anon_key: None,
            db_path: None,
            local_user: LocalUserConfig::default(),
        }
    }
}

/// Identity used when running against the local backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUserConfig {
    /// Stable user id
    #[serde(default = "default_local_user_id")]
    pub id: Uuid,
    /// Email recorded in the local users table
    #[serde(default = "default_local_user_email")]
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

fn default_local_user_id() -> Uuid {
    Uuid::from_u128(0x5f0c_2a8e_7d1b_4c3a_9e6f_1a2b_3c4d_5e6f)
}

fn default_local_user_email() -> String {
    "me@localhost".to_string()
}

impl Default for LocalUserConfig {
    fn default() -> Self {
        Self {
            id: default_local_user_id(),
            email: default_local_user_email(),
            name: None,
        }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_http_timeout() -> u64 {
    120
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_http_timeout(),
        }
    }
}

/// Chat completion and speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API base URL (useful for tests and local mocks)
    #[serde(default = "default_ai_api_base")]
    pub api_base: String,

    /// API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for replies and titles
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for transcription
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
}

fn default_ai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-2024-11-20".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: default_ai_api_base(),
            api_key: None,
            chat_model: default_chat_model(),
            transcription_model: default_transcription_model(),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Synthesize and play replies
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API base URL
    #[serde(default = "default_speech_api_base")]
    pub api_base: String,

    /// API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Voice identifier
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// Synthesis model
    #[serde(default = "default_speech_model")]
    pub model_id: String,

    /// Audio output format
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_true() -> bool {
    true
}

fn default_speech_api_base() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}

fn default_voice_id() -> String {
    "XB0fDUnXU5powFXDhCwa".to_string()
}

fn default_speech_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_base: default_speech_api_base(),
            api_key: None,
            voice_id: default_voice_id(),
            model_id: default_speech_model(),
            output_format: default_output_format(),
        }
    }
}

/// Journaling behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Sender id used for assistant replies
    #[serde(default = "default_assistant_id")]
    pub assistant_sender_id: Uuid,

    /// Label used for the assistant in transcripts
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,

    /// System prompt for replies
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Name given to new conversations
    #[serde(default = "default_conversation_name")]
    pub default_conversation_name: String,

    /// Messages per history page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Characters kept in a conversation preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Message count that triggers title generation
    #[serde(default = "default_title_after")]
    pub title_after_messages: usize,

    /// Drop realtime inserts whose id is already in the list
    #[serde(default)]
    pub dedupe_realtime: bool,
}

fn default_assistant_id() -> Uuid {
    Uuid::from_u128(0x13b8_449a_c108_40d9_8050_e5c5_f365_9bcc)
}

fn default_assistant_label() -> String {
    "Therapist".to_string()
}

fn default_persona() -> String {
    "You are an empathetic and professional mental health therapist. Keep your responses \
     short and to the point. Your responses should be supportive, understanding, and help \
     guide the user toward better mental well-being. Focus on active listening, validation, \
     and gentle guidance."
        .to_string()
}

fn default_conversation_name() -> String {
    "New Voice Chat".to_string()
}

fn default_page_size() -> usize {
    20
}

fn default_preview_chars() -> usize {
    100
}

fn default_title_after() -> usize {
    3
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            assistant_sender_id: default_assistant_id(),
            assistant_label: default_assistant_label(),
            persona: default_persona(),
            default_conversation_name: default_conversation_name(),
            page_size: default_page_size(),
            preview_chars: default_preview_chars(),
            title_after_messages: default_title_after(),
            dedupe_realtime: false,
        }
    }
}

/// External commands used for audio capture and output
///
/// `{output}` is replaced by the recording path, `{input}` by the file to
/// play and `{text}` by the text to speak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Whether microphone use is allowed without asking
    #[serde(default)]
    pub microphone_allowed: bool,

    /// Recorder command; runs until stopped
    #[serde(default = "default_record_command")]
    pub record_command: Vec<String>,

    /// File extension of recordings
    #[serde(default = "default_record_extension")]
    pub record_extension: String,

    /// Audio player command
    #[serde(default = "default_play_command")]
    pub play_command: Vec<String>,

    /// Plain speech command used as fallback
    #[serde(default = "default_speak_command")]
    pub speak_command: Vec<String>,
}

fn default_record_command() -> Vec<String> {
    vec!["sox".into(), "-d".into(), "-q".into(), "{output}".into()]
}

fn default_record_extension() -> String {
    "wav".to_string()
}

fn default_play_command() -> Vec<String> {
    vec![
        "ffplay".into(),
        "-nodisp".into(),
        "-autoexit".into(),
        "-loglevel".into(),
        "quiet".into(),
        "{input}".into(),
    ]
}

fn default_speak_command() -> Vec<String> {
    vec!["espeak".into(), "{text}".into()]
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            microphone_allowed: false,
            record_command: default_record_command(),
            record_extension: default_record_extension(),
            play_command: default_play_command(),
            speak_command: default_speak_command(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| JournalError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| JournalError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(backend) = std::env::var("JOURNAL_BACKEND") {
            match backend.parse() {
                Ok(kind) => self.backend.kind = kind,
                Err(_) => tracing::warn!("Invalid JOURNAL_BACKEND: {}", backend),
            }
        }

        if let Ok(url) = std::env::var("JOURNAL_SUPABASE_URL") {
            self.backend.url = Some(url);
        }

        if let Ok(key) = std::env::var("JOURNAL_SUPABASE_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }

        if let Ok(path) = std::env::var("JOURNAL_DB_PATH") {
            self.backend.db_path = Some(PathBuf::from(path));
        }

        if let Ok(key) = std::env::var("JOURNAL_OPENAI_API_KEY") {
            self.ai.api_key = Some(key);
        }

        if let Ok(base) = std::env::var("JOURNAL_OPENAI_API_BASE") {
            self.ai.api_base = base;
        }

        if let Ok(model) = std::env::var("JOURNAL_CHAT_MODEL") {
            self.ai.chat_model = model;
        }

        if let Ok(key) = std::env::var("JOURNAL_ELEVENLABS_API_KEY") {
            self.speech.api_key = Some(key);
        }

        if let Ok(enabled) = std::env::var("JOURNAL_SPEECH_ENABLED") {
            match enabled.parse::<bool>() {
                Ok(v) => {
                    self.speech.enabled = v;
                    tracing::debug!(enabled = v, "Env override: JOURNAL_SPEECH_ENABLED");
                }
                Err(_) => tracing::warn!("Invalid value for JOURNAL_SPEECH_ENABLED: {}", enabled),
            }
        }

        if let Ok(id) = std::env::var("JOURNAL_ASSISTANT_ID") {
            match Uuid::parse_str(&id) {
                Ok(v) => self.journal.assistant_sender_id = v,
                Err(_) => tracing::warn!("Invalid JOURNAL_ASSISTANT_ID: {}", id),
            }
        }

        if let Ok(page_size) = std::env::var("JOURNAL_PAGE_SIZE") {
            if let Ok(value) = page_size.parse() {
                self.journal.page_size = value;
            } else {
                tracing::warn!("Invalid JOURNAL_PAGE_SIZE: {}", page_size);
            }
        }

        if let Ok(level) = std::env::var("JOURNAL_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(kind) = cli.backend {
            self.backend.kind = kind;
        }
        if let Some(path) = &cli.db_path {
            self.backend.db_path = Some(path.clone());
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.backend.kind == BackendKind::Supabase {
            let url = self.backend.url.as_deref().unwrap_or_default();
            if url.is_empty() {
                return Err(JournalError::Config(
                    "backend.url is required for the supabase backend".to_string(),
                )
                .into());
            }
            if url::Url::parse(url).is_err() {
                return Err(JournalError::Config(format!("Invalid backend.url: {}", url)).into());
            }
            if self.backend.anon_key.as_deref().unwrap_or_default().is_empty() {
                return Err(JournalError::Config(
                    "backend.anon_key is required for the supabase backend".to_string(),
                )
                .into());
            }
        }

        if self.http.timeout_seconds == 0 {
            return Err(JournalError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if url::Url::parse(&self.ai.api_base).is_err() {
            return Err(
                JournalError::Config(format!("Invalid ai.api_base: {}", self.ai.api_base)).into(),
            );
        }

        if self.journal.page_size == 0 || self.journal.page_size > 1000 {
            return Err(JournalError::Config(
                "journal.page_size must be between 1 and 1000".to_string(),
            )
            .into());
        }

        if self.journal.preview_chars == 0 {
            return Err(JournalError::Config(
                "journal.preview_chars must be greater than 0".to_string(),
            )
            .into());
        }

        if self.journal.title_after_messages == 0 {
            return Err(JournalError::Config(
                "journal.title_after_messages must be greater than 0".to_string(),
            )
            .into());
        }

        if self.journal.default_conversation_name.trim().is_empty() {
            return Err(JournalError::Config(
                "journal.default_conversation_name cannot be empty".to_string(),
            )
            .into());
        }

        if self.device.record_command.is_empty() {
            return Err(JournalError::Config(
                "device.record_command cannot be empty".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            http: HttpConfig::default(),
            ai: AiConfig::default(),
            speech: SpeechConfig::default(),
            journal: JournalConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
