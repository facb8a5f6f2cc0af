//! Conversation repository

use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JournalConfig;
use crate::error::{JournalError, Result};
use crate::models::{preview_of, Conversation, ConversationPatch, Message};
use crate::providers::{ChatCompletion, ChatTurn};
use crate::storage::{ConversationFilter, Store};

const TITLE_PROMPT: &str = "Based on this conversation, generate a brief title (3-5 words) that captures the main theme or concern. Return ONLY the title without quotes or punctuation.";

/// Create, read and update conversations
#[derive(Clone)]
pub struct ConversationRepository {
    store: Arc<dyn Store>,
    titles: Option<Arc<dyn ChatCompletion>>,
    config: JournalConfig,
}

impl ConversationRepository {
    /// Repository without title generation
    pub fn new(store: Arc<dyn Store>, config: JournalConfig) -> Self {
        Self {
            store,
            titles: None,
            config,
        }
    }

    /// Generate titles with `chat` once a conversation gets deep enough
    pub fn with_title_generator(mut self, chat: Arc<dyn ChatCompletion>) -> Self {
        self.titles = Some(chat);
        self
    }

    /// Create a conversation named `name` (or the configured default)
    pub async fn create(&self, name: Option<&str>, owner: Option<Uuid>) -> Result<Conversation> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.config.default_conversation_name);
        let conversation = Conversation::new(name, owner);
        let stored = self.store.insert_conversation(&conversation).await?;
        tracing::info!("Created conversation {} ({})", stored.id, stored.name);
        Ok(stored)
    }

    /// Fetch a conversation
    ///
    /// # Errors
    ///
    /// Returns `JournalError::NotFound` when it does not exist.
    pub async fn get(&self, id: Uuid) -> Result<Conversation> {
        self.store
            .get_conversation(id)
            .await?
            .ok_or_else(|| JournalError::NotFound(format!("Conversation {} not found", id)).into())
    }

    /// Conversations matching `filter`, most recent activity first
    pub async fn list(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let mut conversations = self.store.list_conversations(filter).await?;
        conversations.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(conversations)
    }

    /// Refresh a conversation after `message` was appended to it
    ///
    /// Sets the last message, preview and activity time. The append that
    /// brings the conversation to `title_after_messages` messages also
    /// renames it with a generated title; if that fails the plain update is
    /// applied instead.
    ///
    /// The title request is awaited before the row is patched, so that append
    /// returns only once the chat model has answered. Name and activity land
    /// in one update, and a short-lived process cannot exit with the title
    /// still in flight.
    pub async fn update_on_new_message(&self, message: &Message) -> Result<()> {
        let mut patch = ConversationPatch {
            name: None,
            last_message: Some(message.content.clone()),
            preview: Some(preview_of(&message.content, self.config.preview_chars)),
            last_activity: Some(message.created_at),
        };

        if self.titles.is_some() {
            let count = self.store.count_messages(message.conversation_id).await?;
            if count == self.config.title_after_messages {
                match self.generate_title(message.conversation_id).await {
                    Ok(title) => {
                        tracing::info!(
                            "Titled conversation {}: {}",
                            message.conversation_id,
                            title
                        );
                        patch.name = Some(title);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Title generation failed for {}: {}",
                            message.conversation_id,
                            e
                        );
                    }
                }
            }
        }

        self.store
            .update_conversation(message.conversation_id, &patch)
            .await
    }

    /// Ask the chat model for a short title summarizing the conversation
    pub async fn generate_title(&self, conversation_id: Uuid) -> Result<String> {
        let chat = self
            .titles
            .as_ref()
            .ok_or_else(|| JournalError::Config("No title generator configured".to_string()))?;

        let messages = self.store.list_all_messages(conversation_id).await?;
        let transcript = self.transcript(&messages);
        let response = chat
            .complete(&[ChatTurn::system(TITLE_PROMPT), ChatTurn::user(transcript)])
            .await?;

        let title = response.content.trim();
        if title.is_empty() {
            Ok(self.config.default_conversation_name.clone())
        } else {
            Ok(title.to_string())
        }
    }

    /// `User: ...` / `<assistant>: ...` lines, oldest first
    pub fn transcript(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let speaker = if m.sender_id == self.config.assistant_sender_id {
                    self.config.assistant_label.as_str()
                } else {
                    "User"
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Group conversations into per-day sections, newest day first
///
/// Within a section the input order is kept.
///
/// # Examples
///
/// ```
/// use voice_journal::journal::group_by_day;
/// use voice_journal::models::Conversation;
///
/// let sections = group_by_day(vec![Conversation::new("a", None), Conversation::new("b", None)]);
/// assert_eq!(sections.len(), 1);
/// assert_eq!(sections[0].1.len(), 2);
/// ```
pub fn group_by_day(conversations: Vec<Conversation>) -> Vec<(NaiveDate, Vec<Conversation>)> {
    let mut sections: Vec<(NaiveDate, Vec<Conversation>)> = Vec::new();
    for conversation in conversations {
        let day = conversation.last_activity.date_naive();
        match sections.iter_mut().find(|(d, _)| *d == day) {
            Some((_, items)) => items.push(conversation),
            None => sections.push((day, vec![conversation])),
        }
    }
    sections.sort_by(|a, b| b.0.cmp(&a.0));
    sections
}
