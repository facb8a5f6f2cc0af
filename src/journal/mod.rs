//! Personal voice journal
//!
//! Conversations between the signed-in user and the assistant:
//!
//! - [`ConversationRepository`] creates, lists and refreshes conversations
//! - [`MessageRepository`] appends to and pages through the message log
//! - [`LiveConversation`] merges realtime inserts into an open view
//! - [`RecordingPipeline`] turns a recording into a stored exchange

pub mod conversations;
pub mod live;
pub mod messages;
pub mod pipeline;

pub use conversations::{group_by_day, ConversationRepository};
pub use live::{LiveConversation, MergeOutcome};
pub use messages::MessageRepository;
pub use pipeline::{Exchange, PipelineDeps, PipelineState, RecordingPipeline};

use std::sync::Arc;

use crate::config::JournalConfig;
use crate::providers::ChatCompletion;
use crate::storage::Store;

/// Both repositories wired to one store
#[derive(Clone)]
pub struct Journal {
    /// Conversation repository
    pub conversations: ConversationRepository,
    /// Message repository sharing the conversation repository
    pub messages: MessageRepository,
}

impl Journal {
    /// Build the repositories; titles are generated only when `chat` is given
    pub fn new(
        store: Arc<dyn Store>,
        chat: Option<Arc<dyn ChatCompletion>>,
        config: &JournalConfig,
    ) -> Self {
        let mut conversations = ConversationRepository::new(store.clone(), config.clone());
        if let Some(chat) = chat {
            conversations = conversations.with_title_generator(chat);
        }
        let messages = MessageRepository::new(store, conversations.clone(), config.page_size);
        Self {
            conversations,
            messages,
        }
    }
}
