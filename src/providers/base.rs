//! Provider traits and common types
//!
//! The journal depends on three AI capabilities: chat completion,
//! speech-to-text and text-to-speech. Each is a trait so the pipeline and
//! repositories can be driven by mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::audio::AudioClip;
use crate::error::Result;

/// One turn sent to a chat-completion model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Role of the sender (system, user, assistant)
    pub role: String,
    /// Content of the turn
    pub content: String,
}

impl ChatTurn {
    /// Creates a user turn
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::providers::ChatTurn;
    ///
    /// let turn = ChatTurn::user("I had a long day");
    /// assert_eq!(turn.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage reported by a completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: usize,
    /// Tokens in the completion
    pub completion_tokens: usize,
    /// Sum of both
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Build usage from prompt and completion counts
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Text returned by a chat completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Response without usage information
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    /// Response with usage information
    pub fn with_usage(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage: Some(usage),
        }
    }
}

/// Chat-completion model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Complete the conversation `turns`
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Api` on a non-success status and
    /// `JournalError::Provider` when the response has no content.
    async fn complete(&self, turns: &[ChatTurn]) -> Result<CompletionResponse>;
}

/// Speech-to-text model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `clip` to text
    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;
}

/// Text-to-speech model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` to encoded audio bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// File extension of the audio produced
    fn extension(&self) -> &str {
        "mp3"
    }
}
