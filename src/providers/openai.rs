//! OpenAI chat-completion and transcription client

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::audio::AudioClip;
use super::base::{ChatCompletion, ChatTurn, CompletionResponse, TokenUsage, Transcriber};
use crate::config::AiConfig;
use crate::error::{JournalError, Result};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI API client
///
/// # Examples
///
/// ```
/// use voice_journal::config::AiConfig;
/// use voice_journal::providers::OpenAiClient;
///
/// let config = AiConfig {
///     api_key: Some("sk-test".to_string()),
///     ..Default::default()
/// };
/// assert!(OpenAiClient::new(config, 30).is_ok());
/// ```
pub struct OpenAiClient {
    client: Client,
    config: AiConfig,
    api_key: String,
}

impl OpenAiClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Config` when no API key is configured.
    pub fn new(config: AiConfig, timeout_seconds: u64) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            JournalError::Config(
                "OpenAI API key not configured (set ai.api_key or JOURNAL_OPENAI_API_KEY)"
                    .to_string(),
            )
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("voice-journal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JournalError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized OpenAI client: base={}, chat_model={}, transcription_model={}",
            config.api_base,
            config.chat_model,
            config.transcription_model
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

async fn check(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    tracing::error!("{} returned error {}: {}", service, status, error_text);
    Err(JournalError::Api {
        status: status.as_u16(),
        message: error_text,
    }
    .into())
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<CompletionResponse> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: turns,
        };
        tracing::debug!("Sending chat completion request: {} turns", turns.len());

        let response = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Chat completion request failed: {}", e);
                JournalError::Http(e)
            })?;
        let response = check("Chat completion", response).await?;

        let body: ChatResponse = response.json().await.map_err(|e| {
            JournalError::Provider(format!("Failed to parse chat completion: {}", e))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| JournalError::Provider("Chat completion had no content".to_string()))?;

        Ok(match body.usage {
            Some(u) => CompletionResponse::with_usage(
                content,
                TokenUsage::new(u.prompt_tokens, u.completion_tokens),
            ),
            None => CompletionResponse::new(content),
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        tracing::debug!(
            "Uploading {} bytes for transcription as {}",
            clip.bytes.len(),
            clip.content_type()
        );

        let part = Part::bytes(clip.bytes.clone())
            .file_name(clip.upload_name())
            .mime_str(clip.content_type())
            .map_err(|e| JournalError::Provider(format!("Invalid audio content type: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .client
            .post(self.url("/audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Transcription request failed: {}", e);
                JournalError::Http(e)
            })?;
        let response = check("Transcription", response).await?;

        let body: TranscriptionResponse = response.json().await.map_err(|e| {
            JournalError::Provider(format!("Failed to parse transcription: {}", e))
        })?;
        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        let err = OpenAiClient::new(AiConfig::default(), 5).err().unwrap();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_url_joins_base() {
        let config = AiConfig {
            api_base: "http://localhost:9999/v1/".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let client = OpenAiClient::new(config, 5).unwrap();
        assert_eq!(
            client.url("/chat/completions"),
            "http://localhost:9999/v1/chat/completions"
        );
    }

    #[test]
    fn test_chat_response_without_usage_parses() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi"}}]}"#,
        )
        .unwrap();
        assert!(body.usage.is_none());
        assert_eq!(body.choices[0].message.content.as_deref(), Some("Hi"));
    }
}
