//! ElevenLabs text-to-speech client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::base::SpeechSynthesizer;
use crate::config::SpeechConfig;
use crate::error::{JournalError, Result};

/// Text-to-speech over the ElevenLabs REST API
pub struct ElevenLabsClient {
    client: Client,
    config: SpeechConfig,
    api_key: String,
}

impl ElevenLabsClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Config` when no API key is configured.
    pub fn new(config: SpeechConfig, timeout_seconds: u64) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            JournalError::Config(
                "ElevenLabs API key not configured (set speech.api_key or JOURNAL_ELEVENLABS_API_KEY)"
                    .to_string(),
            )
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("voice-journal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JournalError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized ElevenLabs client: voice={}, model={}",
            config.voice_id,
            config.model_id
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/text-to-speech/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!("Synthesizing {} characters", text.chars().count());

        let response = self
            .client
            .post(self.url())
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&json!({
                "text": text,
                "model_id": self.config.model_id,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Speech synthesis request failed: {}", e);
                JournalError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("ElevenLabs returned error {}: {}", status, error_text);
            return Err(JournalError::Api {
                status: status.as_u16(),
                message: error_text,
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(JournalError::Http)?;
        if bytes.is_empty() {
            return Err(JournalError::Provider("Speech synthesis returned no audio".to_string()).into());
        }
        Ok(bytes.to_vec())
    }

    fn extension(&self) -> &str {
        self.config
            .output_format
            .split('_')
            .next()
            .filter(|ext| !ext.is_empty())
            .unwrap_or("mp3")
    }
}
