//! Persistence seams for journal data
//!
//! Every table the application touches sits behind one of four traits.
//! [`RestStore`] talks to the hosted Postgres REST gateway, [`SqliteStore`]
//! keeps the same tables in a local database and doubles as a realtime
//! feed for its own inserts.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ChatMessage, Conversation, ConversationPatch, GroupChat, GroupMember, Message, User,
};

pub mod rest;
pub mod sqlite;
pub mod types;

pub use rest::RestStore;
pub use sqlite::SqliteStore;
pub use types::{ConversationFilter, MessageWindow};

/// Conversation table access
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a conversation and return the stored row
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<Conversation>;

    /// Fetch one conversation
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Conversations matching the owner and day constraints, most recent activity first
    async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>>;

    /// Apply a partial update
    async fn update_conversation(&self, id: Uuid, patch: &ConversationPatch) -> Result<()>;
}

/// Append-only message log access
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message; the parent conversation must exist
    async fn insert_message(&self, message: &Message) -> Result<Message>;

    /// Messages of a conversation, newest first, restricted to `window`
    async fn list_messages_desc(
        &self,
        conversation_id: Uuid,
        window: MessageWindow,
    ) -> Result<Vec<Message>>;

    /// Every message of a conversation, oldest first
    async fn list_all_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Number of messages in a conversation
    async fn count_messages(&self, conversation_id: Uuid) -> Result<usize>;
}

/// User table access
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch one user
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Look a user up by exact email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fetch several users at once; missing ids are skipped
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>>;

    /// Insert or replace a user row
    async fn upsert_user(&self, user: &User) -> Result<()>;

    /// Change a user's display name
    async fn update_display_name(&self, id: Uuid, name: &str) -> Result<()>;
}

/// Group chat tables access
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Insert a group chat
    async fn insert_chat(&self, chat: &GroupChat) -> Result<()>;

    /// Fetch one group chat
    async fn get_chat(&self, id: Uuid) -> Result<Option<GroupChat>>;

    /// Insert a membership; `(chat_id, user_id)` is unique
    async fn insert_member(&self, member: &GroupMember) -> Result<()>;

    /// Membership of `user_id` in `chat_id`, if any
    async fn find_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>>;

    /// Members of a chat ordered by join time
    async fn list_members(&self, chat_id: Uuid) -> Result<Vec<GroupMember>>;

    /// Chats a user belongs to, newest first
    async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<GroupChat>>;

    /// Insert a chat message
    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<()>;

    /// Messages of a chat, oldest first
    async fn list_chat_messages(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>>;

    /// Most recent message of a chat
    async fn latest_chat_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>>;
}

/// Everything the application needs from a backend
pub trait Store: ConversationStore + MessageStore + UserStore + GroupStore {}

impl<T> Store for T where T: ConversationStore + MessageStore + UserStore + GroupStore {}
