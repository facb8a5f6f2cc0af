//! Data model shared by the stores, repositories and CLI
//!
//! Field names on the wire follow the hosted schema: journal tables use
//! camelCase columns, user and group tables use snake_case.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::ids::{new_id, now};

/// A voice-journaling thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier
    pub id: Uuid,
    /// Display name (generated title once the conversation has some depth)
    #[serde(rename = "chatName")]
    pub name: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Time of the last appended message (or creation)
    #[serde(rename = "lastDate")]
    pub last_activity: DateTime<Utc>,
    /// Full text of the last message
    #[serde(default)]
    pub last_message: Option<String>,
    /// Truncated last message shown in listings
    #[serde(default)]
    pub preview: Option<String>,
    /// Owning user
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

impl Conversation {
    /// Build a new conversation stamped with the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::models::Conversation;
    ///
    /// let conv = Conversation::new("New Voice Chat", None);
    /// assert_eq!(conv.created_at, conv.last_activity);
    /// assert!(conv.last_message.is_none());
    /// ```
    pub fn new(name: impl Into<String>, owner_id: Option<Uuid>) -> Self {
        let created = now();
        Self {
            id: new_id(),
            name: name.into(),
            created_at: created,
            last_activity: created,
            last_message: None,
            preview: None,
            owner_id,
        }
    }
}

/// Partial update applied to a conversation row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    /// New display name
    #[serde(rename = "chatName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New last message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// New preview
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// New last activity time
    #[serde(rename = "lastDate", skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier, generated client-side
    pub id: Uuid,
    /// Parent conversation
    pub conversation_id: Uuid,
    /// Author: a user id or the configured assistant id
    pub sender_id: Uuid,
    /// Transcribed or generated text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a new message stamped with the current time
    pub fn new(conversation_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            conversation_id,
            sender_id,
            content: content.into(),
            created_at: now(),
        }
    }
}

/// Application user row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identifier shared with the auth service
    pub id: Uuid,
    /// Email address (unique)
    pub email: String,
    /// Display name
    #[serde(rename = "full_name", default)]
    pub display_name: Option<String>,
}

impl User {
    /// Display name, or "Unknown User" when unset
    pub fn name_or_unknown(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown User")
    }
}

/// A group chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChat {
    /// Unique identifier
    pub id: Uuid,
    /// Group name
    pub name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Membership of a user in a group chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Unique identifier
    pub id: Uuid,
    /// Group chat
    pub chat_id: Uuid,
    /// Member
    pub user_id: Uuid,
    /// When the user joined
    pub joined_at: DateTime<Utc>,
}

/// A message posted in a group chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier
    pub id: Uuid,
    /// Group chat
    pub chat_id: Uuid,
    /// Author
    pub user_id: Uuid,
    /// Text
    pub text: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Remote persistence state of a locally created entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Shown locally, not yet acknowledged by the store
    Pending,
    /// Acknowledged by the store
    Committed,
    /// The store rejected it; the entity stays visible but flagged
    Failed(String),
}

/// An entity together with its [`SyncState`]
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    /// The entity
    pub value: T,
    /// Persistence state
    pub state: SyncState,
}

impl<T> Tracked<T> {
    /// Wrap a locally created entity awaiting acknowledgement
    pub fn pending(value: T) -> Self {
        Self {
            value,
            state: SyncState::Pending,
        }
    }

    /// Wrap an entity known to be persisted
    pub fn committed(value: T) -> Self {
        Self {
            value,
            state: SyncState::Committed,
        }
    }

    /// Mark as acknowledged
    pub fn commit(&mut self) {
        self.state = SyncState::Committed;
    }

    /// Mark as rejected
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = SyncState::Failed(reason.into());
    }

    /// Whether the store acknowledged this entity
    pub fn is_committed(&self) -> bool {
        self.state == SyncState::Committed
    }
}

/// First `max_chars` characters of `content`
///
/// Counts characters rather than bytes so multi-byte text is never split.
///
/// # Examples
///
/// ```
/// use voice_journal::models::preview_of;
///
/// assert_eq!(preview_of("héllo world", 5), "héllo");
/// assert_eq!(preview_of("short", 100), "short");
/// ```
pub fn preview_of(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Whether `email` looks like `local@domain.tld`
///
/// # Examples
///
/// ```
/// use voice_journal::models::is_valid_email;
///
/// assert!(is_valid_email("ada@example.com"));
/// assert!(!is_valid_email("ada@"));
/// ```
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .map(|re| re.is_match(email))
        .unwrap_or_else(|| email.contains('@'))
}
