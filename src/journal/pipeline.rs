//! Recording -> transcription -> reply pipeline
//!
//! One [`RecordingPipeline`] drives one recording session at a time:
//!
//! ```text
//! Idle -> Recording -> Transcribing -> MessagePersisted
//!      -> AwaitingAiResponse -> ResponsePersisted -> Idle
//! ```
//!
//! Any failing step sends an alert and returns to `Idle`. Nothing is
//! retried and nothing already persisted is rolled back.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use super::{ConversationRepository, MessageRepository};
use crate::alert::{Alert, AlertSink};
use crate::auth::SessionContext;
use crate::config::JournalConfig;
use crate::device::{AudioOutput, Microphone, Permission};
use crate::error::Result;
use crate::ids::new_id;
use crate::models::{Conversation, Message};
use crate::providers::{AudioClip, ChatCompletion, ChatTurn, SpeechSynthesizer, Transcriber};

const PERMISSION_DENIED: &str = "Permission to access microphone was denied";
const CREATE_FAILED: &str = "Failed to create conversation";
const TRANSCRIBE_FAILED: &str = "Failed to transcribe audio";
const SAVE_FAILED: &str = "Failed to save message";
const REPLY_FAILED: &str = "Failed to get AI response";

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Waiting for a recording
    Idle,
    /// Microphone is capturing
    Recording,
    /// Clip is being transcribed
    Transcribing,
    /// The transcript was stored as a user message
    MessagePersisted,
    /// Waiting for the chat model
    AwaitingAiResponse,
    /// The reply was stored
    ResponsePersisted,
}

/// Result of one completed pass through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// The transcribed user message
    pub user_message: Message,
    /// The assistant reply, absent when the chat step failed
    pub reply: Option<Message>,
}

/// Collaborators of a pipeline
pub struct PipelineDeps {
    /// Conversation repository
    pub conversations: ConversationRepository,
    /// Message repository
    pub messages: MessageRepository,
    /// Speech-to-text
    pub transcriber: Arc<dyn Transcriber>,
    /// Chat model for replies
    pub chat: Arc<dyn ChatCompletion>,
    /// Reply synthesis; `None` uses the plain speech command
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    /// Playback and plain speech
    pub output: Arc<dyn AudioOutput>,
    /// Capture device
    pub microphone: Box<dyn Microphone>,
    /// Where alerts go
    pub alerts: Arc<dyn AlertSink>,
    /// Signed-in user
    pub session: Arc<SessionContext>,
}

/// Voice exchange state machine
pub struct RecordingPipeline {
    deps: PipelineDeps,
    config: JournalConfig,
    conversation: Option<Conversation>,
    state: watch::Sender<PipelineState>,
}

impl RecordingPipeline {
    /// Create an idle pipeline without a conversation
    pub fn new(deps: PipelineDeps, config: JournalConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            deps,
            config,
            conversation: None,
            state,
        }
    }

    /// Continue an existing conversation instead of creating one
    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = Some(conversation);
        self
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Follow state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Conversation the pipeline appends to, once created
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Begin recording; returns whether the microphone is now capturing
    ///
    /// Requests microphone permission when it has not been granted yet and
    /// creates the conversation on first use.
    pub async fn start_recording(&mut self) -> bool {
        if self.state() != PipelineState::Idle {
            tracing::debug!("start_recording ignored in state {:?}", self.state());
            return false;
        }

        if !self.ensure_permission().await {
            self.fail(Alert::error(PERMISSION_DENIED));
            return false;
        }

        if self.ensure_conversation().await.is_none() {
            return false;
        }

        if let Err(e) = self.deps.microphone.start().await {
            tracing::error!("Failed to start recording: {}", e);
            self.fail(Alert::from_error(&e, "Failed to start recording"));
            return false;
        }

        self.transition(PipelineState::Recording);
        true
    }

    /// Stop recording and run the exchange
    ///
    /// A no-op returning `None` when nothing is being recorded.
    pub async fn stop_recording(&mut self) -> Option<Exchange> {
        if self.state() != PipelineState::Recording {
            return None;
        }

        let path = match self.deps.microphone.stop().await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Failed to stop recording: {}", e);
                self.fail(Alert::from_error(&e, TRANSCRIBE_FAILED));
                return None;
            }
        };

        self.process_clip(&path).await
    }

    /// Run the exchange on a prerecorded clip
    pub async fn submit_clip(&mut self, path: &Path) -> Option<Exchange> {
        if self.state() != PipelineState::Idle {
            tracing::debug!("submit_clip ignored in state {:?}", self.state());
            return None;
        }
        self.ensure_conversation().await?;
        self.process_clip(path).await
    }

    async fn ensure_permission(&mut self) -> bool {
        match self.deps.microphone.permission() {
            Permission::Granted => true,
            Permission::Denied => false,
            Permission::Undetermined => match self.deps.microphone.request_permission().await {
                Ok(granted) => granted,
                Err(e) => {
                    tracing::warn!("Microphone permission request failed: {}", e);
                    false
                }
            },
        }
    }

    async fn ensure_conversation(&mut self) -> Option<Conversation> {
        if let Some(conversation) = &self.conversation {
            return Some(conversation.clone());
        }

        let owner = match self.deps.session.user_id() {
            Ok(id) => id,
            Err(e) => {
                self.fail(Alert::from_error(&e, CREATE_FAILED));
                return None;
            }
        };

        match self.deps.conversations.create(None, Some(owner)).await {
            Ok(conversation) => {
                self.conversation = Some(conversation.clone());
                Some(conversation)
            }
            Err(e) => {
                tracing::error!("Failed to create conversation: {}", e);
                self.fail(Alert::error(CREATE_FAILED));
                None
            }
        }
    }

    async fn process_clip(&mut self, path: &Path) -> Option<Exchange> {
        let conversation_id = self.conversation.as_ref()?.id;
        self.transition(PipelineState::Transcribing);

        let text = match self.transcribe(path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Transcription failed: {}", e);
                self.fail(Alert::error(TRANSCRIBE_FAILED));
                return None;
            }
        };

        let user_id = match self.deps.session.user_id() {
            Ok(id) => id,
            Err(e) => {
                self.fail(Alert::from_error(&e, SAVE_FAILED));
                return None;
            }
        };

        let user_message = match self.deps.messages.append(conversation_id, user_id, &text).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to save transcript: {}", e);
                self.fail(Alert::error(SAVE_FAILED));
                return None;
            }
        };
        self.transition(PipelineState::MessagePersisted);

        self.transition(PipelineState::AwaitingAiResponse);
        let reply_text = match self.reply_to(&text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Chat completion failed: {}", e);
                self.fail(Alert::error(REPLY_FAILED));
                return Some(Exchange {
                    user_message,
                    reply: None,
                });
            }
        };

        let reply = match self
            .deps
            .messages
            .append(conversation_id, self.config.assistant_sender_id, &reply_text)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to save reply: {}", e);
                self.fail(Alert::error(SAVE_FAILED));
                return Some(Exchange {
                    user_message,
                    reply: None,
                });
            }
        };
        self.transition(PipelineState::ResponsePersisted);

        self.speak(&reply.content).await;
        self.transition(PipelineState::Idle);

        Some(Exchange {
            user_message,
            reply: Some(reply),
        })
    }

    async fn transcribe(&self, path: &Path) -> Result<String> {
        let clip = AudioClip::from_path(path).await?;
        let text = self.deps.transcriber.transcribe(&clip).await?;
        tracing::info!("Transcribed {} characters", text.chars().count());
        Ok(text)
    }

    async fn reply_to(&self, transcript: &str) -> Result<String> {
        let turns = [
            ChatTurn::system(self.config.persona.clone()),
            ChatTurn::user(transcript),
        ];
        let response = self.deps.chat.complete(&turns).await?;
        Ok(response.content)
    }

    /// Synthesize and play `text`, falling back to plain speech
    async fn speak(&self, text: &str) {
        if let Some(speech) = &self.deps.speech {
            match self.play_synthesized(speech.as_ref(), text).await {
                Ok(()) => return,
                Err(e) => tracing::warn!("Synthesized playback failed, using plain speech: {}", e),
            }
        }
        if let Err(e) = self.deps.output.speak(text).await {
            tracing::warn!("Plain speech failed: {}", e);
        }
    }

    async fn play_synthesized(&self, speech: &dyn SpeechSynthesizer, text: &str) -> Result<()> {
        let audio = speech.synthesize(text).await?;
        let path: PathBuf =
            std::env::temp_dir().join(format!("journal-reply-{}.{}", new_id(), speech.extension()));
        tokio::fs::write(&path, &audio)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let played = self.deps.output.play(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("Could not remove {}: {}", path.display(), e);
        }
        played
    }

    fn transition(&self, next: PipelineState) {
        tracing::debug!("Pipeline: {:?} -> {:?}", self.state(), next);
        self.state.send_replace(next);
    }

    fn fail(&self, alert: Alert) {
        self.deps.alerts.alert(alert);
        self.transition(PipelineState::Idle);
    }
}
