//! AI providers
//!
//! Chat completion and transcription come from OpenAI, speech synthesis
//! from ElevenLabs. Everything above this module only sees the traits in
//! [`base`].

pub mod audio;
pub mod base;
pub mod elevenlabs;
pub mod openai;

pub use audio::{AudioClip, AudioFormat};
pub use base::{
    ChatCompletion, ChatTurn, CompletionResponse, SpeechSynthesizer, TokenUsage, Transcriber,
};
pub use elevenlabs::ElevenLabsClient;
pub use openai::OpenAiClient;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

/// Chat and transcription backends built from configuration
pub struct Providers {
    /// Chat-completion model
    pub chat: Arc<dyn ChatCompletion>,
    /// Speech-to-text model
    pub transcriber: Arc<dyn Transcriber>,
    /// Text-to-speech model; `None` when disabled or not configured
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
}

/// Create the provider set described by `config`
///
/// Speech synthesis is optional: when it is disabled or has no API key the
/// pipeline falls back to the plain speech command.
///
/// # Errors
///
/// Returns error if the OpenAI client cannot be created.
pub fn create_providers(config: &Config) -> Result<Providers> {
    let openai = Arc::new(OpenAiClient::new(
        config.ai.clone(),
        config.http.timeout_seconds,
    )?);

    let speech: Option<Arc<dyn SpeechSynthesizer>> = if !config.speech.enabled {
        None
    } else {
        match ElevenLabsClient::new(config.speech.clone(), config.http.timeout_seconds) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Speech synthesis unavailable: {}", e);
                None
            }
        }
    };

    Ok(Providers {
        chat: openai.clone(),
        transcriber: openai,
        speech,
    })
}
