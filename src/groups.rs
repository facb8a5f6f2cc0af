//! Group chats
//!
//! Users can create named group chats, invite other registered users by
//! email and exchange text messages. Each group's messages are visible to
//! all of its members.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::error::{JournalError, Result};
use crate::ids::{new_id, now};
use crate::models::{is_valid_email, ChatMessage, GroupChat, GroupMember, User};
use crate::realtime::{ChangeFeed, RowFilter, Subscription};
use crate::storage::Store;

const NO_MESSAGES: &str = "No messages yet";

/// Result of an invitation
#[derive(Debug, Clone, PartialEq)]
pub enum InviteOutcome {
    /// The user was added
    Added(GroupMember),
    /// The user was already a member; nothing changed
    AlreadyMember,
}

/// A group together with a one-line preview of its latest message
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    /// The group
    pub chat: GroupChat,
    /// `"<sender>: <text>"` or "No messages yet"
    pub preview: String,
}

/// A member with their user row, when it exists
#[derive(Debug, Clone, PartialEq)]
pub struct MemberEntry {
    /// Membership row
    pub member: GroupMember,
    /// Display name, "Unknown User" if unresolved
    pub name: String,
    /// Email, if the user row exists
    pub email: Option<String>,
}

/// A message with its sender's display name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMessage {
    /// The message
    pub message: ChatMessage,
    /// Sender display name, "Unknown User" if unresolved
    pub sender: String,
}

/// Group chat operations on behalf of the signed-in user
#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn Store>,
    session: Arc<SessionContext>,
}

impl GroupService {
    /// Create the service
    pub fn new(store: Arc<dyn Store>, session: Arc<SessionContext>) -> Self {
        Self { store, session }
    }

    /// Create a group named `name` with the current user as first member
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Validation` when the trimmed name is empty.
    pub async fn create_group(&self, name: &str) -> Result<GroupChat> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JournalError::Validation("Group name cannot be empty".to_string()).into());
        }
        let user_id = self.session.user_id()?;

        let chat = GroupChat {
            id: new_id(),
            name: name.to_string(),
            created_at: now(),
        };
        self.store.insert_chat(&chat).await?;
        self.store
            .insert_member(&GroupMember {
                id: new_id(),
                chat_id: chat.id,
                user_id,
                joined_at: now(),
            })
            .await?;

        tracing::info!("Created group {} ({})", chat.id, chat.name);
        Ok(chat)
    }

    /// Invite the registered user with `email` to `chat_id`
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Validation` for an empty or malformed email and
    /// `JournalError::NotFound` when no user has that email.
    pub async fn invite(&self, chat_id: Uuid, email: &str) -> Result<InviteOutcome> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(JournalError::Validation("Enter a valid email".to_string()).into());
        }

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| JournalError::NotFound("User not found".to_string()))?;

        if self.store.find_member(chat_id, user.id).await?.is_some() {
            tracing::debug!("User {} already in group {}", user.id, chat_id);
            return Ok(InviteOutcome::AlreadyMember);
        }

        let member = GroupMember {
            id: new_id(),
            chat_id,
            user_id: user.id,
            joined_at: now(),
        };
        self.store.insert_member(&member).await?;
        tracing::info!("Added {} to group {}", user.id, chat_id);
        Ok(InviteOutcome::Added(member))
    }

    /// Members of `chat_id` in join order
    pub async fn members(&self, chat_id: Uuid) -> Result<Vec<MemberEntry>> {
        let members = self.store.list_members(chat_id).await?;
        let ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
        let users = self.users_by_id(&ids).await?;

        Ok(members
            .into_iter()
            .map(|member| {
                let user = users.get(&member.user_id);
                MemberEntry {
                    name: display_name(user),
                    email: user.map(|u| u.email.clone()),
                    member,
                }
            })
            .collect())
    }

    /// The current user's groups, newest first, with previews
    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let user_id = self.session.user_id()?;
        let chats = self.store.chats_for_user(user_id).await?;

        let mut latest = Vec::with_capacity(chats.len());
        for chat in &chats {
            latest.push(self.store.latest_chat_message(chat.id).await?);
        }

        let senders: Vec<Uuid> = latest.iter().flatten().map(|m| m.user_id).collect();
        let users = self.users_by_id(&senders).await?;

        Ok(chats
            .into_iter()
            .zip(latest)
            .map(|(chat, message)| {
                let preview = match message {
                    Some(m) => format!("{}: {}", display_name(users.get(&m.user_id)), m.text),
                    None => NO_MESSAGES.to_string(),
                };
                GroupSummary { chat, preview }
            })
            .collect())
    }

    /// Post `text` to `chat_id`; blank text is ignored and yields `None`
    pub async fn send(&self, chat_id: Uuid, text: &str) -> Result<Option<ChatMessage>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let message = ChatMessage {
            id: new_id(),
            chat_id,
            user_id: self.session.user_id()?,
            text: text.to_string(),
            created_at: now(),
        };
        self.store.insert_chat_message(&message).await?;
        Ok(Some(message))
    }

    /// Messages of `chat_id`, oldest first, with sender names
    pub async fn messages(&self, chat_id: Uuid) -> Result<Vec<NamedMessage>> {
        let messages = self.store.list_chat_messages(chat_id).await?;
        let ids: Vec<Uuid> = messages.iter().map(|m| m.user_id).collect();
        let users = self.users_by_id(&ids).await?;

        Ok(messages
            .into_iter()
            .map(|message| NamedMessage {
                sender: display_name(users.get(&message.user_id)),
                message,
            })
            .collect())
    }

    /// Subscribe to new messages in `chat_id`
    pub async fn subscribe(&self, chat_id: Uuid, feed: &dyn ChangeFeed) -> Result<Subscription> {
        feed.subscribe("chat_messages", Some(RowFilter::eq("chat_id", chat_id)))
            .await
    }

    /// Attach the sender name to a message received live
    pub async fn name_message(&self, message: ChatMessage) -> Result<NamedMessage> {
        let user = self.store.get_user(message.user_id).await?;
        Ok(NamedMessage {
            sender: display_name(user.as_ref()),
            message,
        })
    }

    async fn users_by_id(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, User>> {
        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();
        let users = self.store.users_by_ids(&unique).await?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}

fn display_name(user: Option<&User>) -> String {
    user.map(User::name_or_unknown)
        .unwrap_or("Unknown User")
        .to_string()
}
