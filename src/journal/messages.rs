//! Append-only message log

use std::sync::Arc;
use uuid::Uuid;

use super::conversations::ConversationRepository;
use crate::error::Result;
use crate::models::Message;
use crate::storage::{MessageWindow, Store};

/// Append and page through conversation messages
#[derive(Clone)]
pub struct MessageRepository {
    store: Arc<dyn Store>,
    conversations: ConversationRepository,
    page_size: usize,
}

impl MessageRepository {
    /// Repository paging `page_size` messages at a time
    pub fn new(
        store: Arc<dyn Store>,
        conversations: ConversationRepository,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            conversations,
            page_size,
        }
    }

    /// Number of messages per history page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Append a new message and refresh its conversation
    pub async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        self.append_prepared(Message::new(conversation_id, sender_id, content))
            .await
    }

    /// Append a message whose id and timestamp were assigned by the caller
    ///
    /// The conversation update runs after every successful insert; a failed
    /// update is logged and does not undo the append.
    pub async fn append_prepared(&self, message: Message) -> Result<Message> {
        let stored = self.store.insert_message(&message).await?;
        tracing::debug!(
            "Appended message {} to conversation {}",
            stored.id,
            stored.conversation_id
        );

        if let Err(e) = self.conversations.update_on_new_message(&stored).await {
            tracing::warn!(
                "Failed to update conversation {} after append: {}",
                stored.conversation_id,
                e
            );
        }
        Ok(stored)
    }

    /// History page `page` in ascending order (page 0 holds the newest messages)
    pub async fn list(&self, conversation_id: Uuid, page: usize) -> Result<Vec<Message>> {
        let mut messages = self
            .store
            .list_messages_desc(conversation_id, MessageWindow::page(page, self.page_size))
            .await?;
        messages.reverse();
        Ok(messages)
    }

    /// Every message of a conversation, oldest first
    pub async fn list_all(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.store.list_all_messages(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalConfig;
    use crate::ids::new_id;
    use crate::storage::SqliteStore;
    use tempfile::tempdir;

    fn repos(page_size: usize) -> (ConversationRepository, MessageRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::new_with_path(dir.path().join("j.db")).unwrap());
        let conversations = ConversationRepository::new(store.clone(), JournalConfig::default());
        let messages = MessageRepository::new(store, conversations.clone(), page_size);
        (conversations, messages, dir)
    }

    #[tokio::test]
    async fn test_append_updates_conversation() {
        let (conversations, messages, _dir) = repos(20);
        let conv = conversations.create(None, None).await.unwrap();
        let msg = messages.append(conv.id, new_id(), "hello").await.unwrap();

        let updated = conversations.get(conv.id).await.unwrap();
        assert_eq!(updated.last_message.as_deref(), Some("hello"));
        assert_eq!(updated.last_activity, msg.created_at);
    }

    #[tokio::test]
    async fn test_returned_rows_equal_stored_rows() {
        let (conversations, messages, _dir) = repos(20);
        let conv = conversations.create(None, None).await.unwrap();
        assert_eq!(conversations.get(conv.id).await.unwrap(), conv);

        let msg = messages.append(conv.id, new_id(), "hello").await.unwrap();
        assert_eq!(messages.list_all(conv.id).await.unwrap(), vec![msg.clone()]);
        assert_eq!(messages.list(conv.id, 0).await.unwrap(), vec![msg]);
    }

    #[tokio::test]
    async fn test_pages_walk_backwards() {
        let (conversations, messages, _dir) = repos(3);
        let conv = conversations.create(None, None).await.unwrap();
        for i in 0..7 {
            messages
                .append(conv.id, new_id(), &format!("m{}", i))
                .await
                .unwrap();
        }

        let texts = |page: Vec<Message>| page.into_iter().map(|m| m.content).collect::<Vec<_>>();
        assert_eq!(texts(messages.list(conv.id, 0).await.unwrap()), ["m4", "m5", "m6"]);
        assert_eq!(texts(messages.list(conv.id, 1).await.unwrap()), ["m1", "m2", "m3"]);
        assert_eq!(texts(messages.list(conv.id, 2).await.unwrap()), ["m0"]);
        assert!(messages.list(conv.id, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_missing_conversation_fails() {
        let (_conversations, messages, _dir) = repos(20);
        assert!(messages.append(new_id(), new_id(), "orphan").await.is_err());
    }
}
