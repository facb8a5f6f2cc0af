//! Open conversation view with realtime merge
//!
//! A [`LiveConversation`] holds the visible window of a conversation and
//! merges insert notifications for it as they arrive. Messages sent from
//! this view appear immediately as pending and are committed when either
//! the store acknowledges the insert or the notification for the same id
//! arrives, whichever happens first.
//!
//! Every id this view put on screen itself, by sending it or by loading the
//! first page after subscribing, expects exactly one echo from the feed. That
//! echo is reconciled in place. Only a later delivery of the same id counts
//! as a duplicate.

use std::collections::HashSet;

use uuid::Uuid;

use super::messages::MessageRepository;
use crate::error::Result;
use crate::models::{Message, SyncState, Tracked};
use crate::realtime::{ChangeFeed, RowChange, RowFilter, Subscription};

/// What merging one notification did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new message was appended
    Appended(Uuid),
    /// A message already on screen was acknowledged by its echo
    Committed(Uuid),
    /// The id was already present and committed
    Duplicate(Uuid),
    /// The notification was for another conversation or unreadable
    Ignored,
}

/// Visible messages of one conversation plus its live subscription
pub struct LiveConversation {
    conversation_id: Uuid,
    messages: Vec<Tracked<Message>>,
    repository: MessageRepository,
    subscription: Option<Subscription>,
    pages_loaded: usize,
    exhausted: bool,
    dedupe: bool,
    awaiting_echo: HashSet<Uuid>,
}

impl LiveConversation {
    /// Load the newest page of `conversation_id` and subscribe to its inserts
    pub async fn open(
        conversation_id: Uuid,
        repository: MessageRepository,
        feed: &dyn ChangeFeed,
        dedupe: bool,
    ) -> Result<Self> {
        let subscription = feed
            .subscribe(
                "messages",
                Some(RowFilter::eq("conversationId", conversation_id)),
            )
            .await?;

        let first_page = repository.list(conversation_id, 0).await?;
        let exhausted = first_page.len() < repository.page_size();
        tracing::debug!(
            "Opened conversation {} with {} messages",
            conversation_id,
            first_page.len()
        );

        // Inserts that landed between subscribing and loading arrive again.
        let awaiting_echo = first_page.iter().map(|m| m.id).collect();

        Ok(Self {
            conversation_id,
            messages: first_page.into_iter().map(Tracked::committed).collect(),
            repository,
            subscription: Some(subscription),
            pages_loaded: 1,
            exhausted,
            dedupe,
            awaiting_echo,
        })
    }

    /// Conversation being viewed
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Visible messages, oldest first
    pub fn messages(&self) -> &[Tracked<Message>] {
        &self.messages
    }

    /// Whether older history may still be loaded
    pub fn has_older(&self) -> bool {
        !self.exhausted
    }

    /// Whether the live subscription is still attached
    pub fn is_live(&self) -> bool {
        self.subscription
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    /// Send a message from this view
    ///
    /// The message is shown as pending right away. On failure it stays
    /// visible, marked failed, and the error is returned.
    pub async fn send(&mut self, sender_id: Uuid, content: &str) -> Result<Message> {
        let message = Message::new(self.conversation_id, sender_id, content);
        let id = message.id;
        self.messages.push(Tracked::pending(message.clone()));
        self.awaiting_echo.insert(id);

        match self.repository.append_prepared(message).await {
            Ok(stored) => {
                if let Some(entry) = self.find_mut(id) {
                    entry.commit();
                }
                Ok(stored)
            }
            Err(e) => {
                self.awaiting_echo.remove(&id);
                if let Some(entry) = self.find_mut(id) {
                    entry.fail(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Merge one insert notification
    pub fn apply(&mut self, change: &RowChange) -> MergeOutcome {
        if change.table != "messages" {
            return MergeOutcome::Ignored;
        }
        let message: Message = match serde_json::from_value(change.record.clone()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring unreadable message notification: {}", e);
                return MergeOutcome::Ignored;
            }
        };
        if message.conversation_id != self.conversation_id {
            return MergeOutcome::Ignored;
        }

        let id = message.id;
        let dedupe = self.dedupe;
        let first_echo = self.awaiting_echo.remove(&id);
        if let Some(entry) = self.find_mut(id) {
            match entry.state {
                SyncState::Pending | SyncState::Failed(_) => {
                    entry.value = message;
                    entry.commit();
                    return MergeOutcome::Committed(id);
                }
                SyncState::Committed if first_echo => {
                    entry.value = message;
                    return MergeOutcome::Committed(id);
                }
                SyncState::Committed => {
                    if dedupe {
                        tracing::debug!("Dropped duplicate delivery of message {}", id);
                        return MergeOutcome::Duplicate(id);
                    }
                    tracing::warn!("Duplicate delivery of message {}; appending again", id);
                }
            }
        }

        self.messages.push(Tracked::committed(message));
        MergeOutcome::Appended(id)
    }

    /// Merge every notification already buffered; returns how many changed the view
    pub fn poll(&mut self) -> usize {
        let mut changed = 0;
        while let Some(change) = self.subscription.as_mut().and_then(Subscription::try_next) {
            if !matches!(self.apply(&change), MergeOutcome::Ignored) {
                changed += 1;
            }
        }
        changed
    }

    /// Wait for the next notification and merge it
    ///
    /// Returns `None` once the subscription has ended or been closed.
    pub async fn next_change(&mut self) -> Option<MergeOutcome> {
        let change = self.subscription.as_mut()?.next().await?;
        Some(self.apply(&change))
    }

    /// Append messages another writer stored that no notification announced
    ///
    /// Reads the newest page and appends, oldest first, every message not yet
    /// on screen. Returns the ids added.
    pub async fn refresh(&mut self) -> Result<Vec<Uuid>> {
        let newest = self.repository.list(self.conversation_id, 0).await?;
        let mut added = Vec::new();
        for message in newest {
            let id = message.id;
            if self.find_mut(id).is_some() {
                continue;
            }
            self.awaiting_echo.insert(id);
            self.messages.push(Tracked::committed(message));
            added.push(id);
        }
        if !added.is_empty() {
            tracing::debug!(
                "Refreshed conversation {} with {} messages",
                self.conversation_id,
                added.len()
            );
        }
        Ok(added)
    }

    /// Prepend the next older page; returns the number of messages added
    pub async fn load_older(&mut self) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        let page = self
            .repository
            .list(self.conversation_id, self.pages_loaded)
            .await?;
        self.pages_loaded += 1;
        if page.len() < self.repository.page_size() {
            self.exhausted = true;
        }

        let added = page.len();
        let mut merged: Vec<Tracked<Message>> = page.into_iter().map(Tracked::committed).collect();
        merged.append(&mut self.messages);
        self.messages = merged;
        Ok(added)
    }

    /// Unsubscribe from live updates; the loaded messages stay readable
    pub async fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
            tracing::debug!("Closed conversation {}", self.conversation_id);
        }
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Tracked<Message>> {
        self.messages.iter_mut().find(|m| m.value.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalConfig;
    use crate::ids::new_id;
    use crate::journal::ConversationRepository;
    use crate::storage::{SqliteStore, Store};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Fixture {
        store: Arc<SqliteStore>,
        messages: MessageRepository,
        conversations: ConversationRepository,
        _dir: tempfile::TempDir,
    }

    fn fixture(page_size: usize) -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::new_with_path(dir.path().join("j.db")).unwrap());
        let dyn_store: Arc<dyn Store> = store.clone();
        let conversations = ConversationRepository::new(dyn_store.clone(), JournalConfig::default());
        let messages = MessageRepository::new(dyn_store, conversations.clone(), page_size);
        Fixture {
            store,
            messages,
            conversations,
            _dir: dir,
        }
    }

    fn change_for(message: &Message) -> RowChange {
        RowChange {
            table: "messages".to_string(),
            record: serde_json::to_value(message).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_remote_insert_is_merged_once() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();

        let remote = fx.messages.append(conv.id, new_id(), "from elsewhere").await.unwrap();
        assert_eq!(live.next_change().await, Some(MergeOutcome::Appended(remote.id)));
        assert_eq!(live.messages().len(), 1);
        assert!(live.messages()[0].is_committed());
        live.close().await;
    }

    #[tokio::test]
    async fn test_own_send_reconciles_with_notification() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();

        let sent = live.send(new_id(), "hello").await.unwrap();
        assert!(live.messages()[0].is_committed());
        assert_eq!(live.next_change().await, Some(MergeOutcome::Committed(sent.id)));
        assert_eq!(live.messages().len(), 1);
        assert_eq!(live.poll(), 0);
        live.close().await;
    }

    #[tokio::test]
    async fn test_redelivery_depends_on_dedupe() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();

        for dedupe in [false, true] {
            let mut live =
                LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), dedupe)
                    .await
                    .unwrap();
            let sent = live.send(new_id(), "twice").await.unwrap();
            let sent_count = live.messages().len();
            assert_eq!(live.next_change().await, Some(MergeOutcome::Committed(sent.id)));

            let again = live.apply(&change_for(&sent));
            if dedupe {
                assert_eq!(again, MergeOutcome::Duplicate(sent.id));
                assert_eq!(live.messages().len(), sent_count);
            } else {
                assert_eq!(again, MergeOutcome::Appended(sent.id));
                assert_eq!(live.messages().len(), sent_count + 1);
            }
            live.close().await;
        }
    }

    #[tokio::test]
    async fn test_loaded_message_echo_is_reconciled() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let early = fx.messages.append(conv.id, new_id(), "raced the load").await.unwrap();

        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();
        assert_eq!(live.messages().len(), 1);

        // Delivered by the feed after it was already read from the page.
        assert_eq!(
            live.apply(&change_for(&early)),
            MergeOutcome::Committed(early.id)
        );
        assert_eq!(live.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_expects_no_echo() {
        let fx = fixture(20);
        let mut live = LiveConversation::open(new_id(), fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();
        let _ = live.send(new_id(), "lost").await;
        assert!(live.awaiting_echo.is_empty());
    }

    #[tokio::test]
    async fn test_pending_entry_is_committed_by_notification() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();

        let message = Message::new(conv.id, new_id(), "optimistic");
        live.messages.push(Tracked::pending(message.clone()));
        assert_eq!(
            live.apply(&change_for(&message)),
            MergeOutcome::Committed(message.id)
        );
        assert_eq!(live.messages().len(), 1);
        assert!(live.messages()[0].is_committed());
    }

    #[tokio::test]
    async fn test_other_conversation_is_ignored() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();

        let foreign = Message::new(new_id(), new_id(), "elsewhere");
        assert_eq!(live.apply(&change_for(&foreign)), MergeOutcome::Ignored);
        assert!(live.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_stays_visible() {
        let fx = fixture(20);
        let mut live = LiveConversation::open(new_id(), fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();

        // No such conversation: the insert violates the foreign key.
        assert!(live.send(new_id(), "lost").await.is_err());
        assert_eq!(live.messages().len(), 1);
        assert!(matches!(live.messages()[0].state, SyncState::Failed(_)));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_other_writers() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();

        // Second handle on the same file, with its own notification channel.
        let other: Arc<dyn Store> =
            Arc::new(SqliteStore::new_with_path(fx.store.db_path().to_path_buf()).unwrap());
        let other_conversations = ConversationRepository::new(other.clone(), JournalConfig::default());
        let other_messages = MessageRepository::new(other, other_conversations, 20);
        let first = other_messages.append(conv.id, new_id(), "one").await.unwrap();
        let second = other_messages.append(conv.id, new_id(), "two").await.unwrap();

        assert_eq!(live.poll(), 0);
        assert_eq!(live.refresh().await.unwrap(), vec![first.id, second.id]);
        assert!(live.refresh().await.unwrap().is_empty());
        let texts: Vec<_> = live.messages().iter().map(|m| m.value.content.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);

        // A late notification for a refreshed row is not a new message.
        assert_eq!(live.apply(&change_for(&first)), MergeOutcome::Committed(first.id));
        assert_eq!(live.messages().len(), 2);
        live.close().await;
    }

    #[tokio::test]
    async fn test_load_older_prepends() {
        let fx = fixture(2);
        let conv = fx.conversations.create(None, None).await.unwrap();
        for i in 0..5 {
            fx.messages.append(conv.id, new_id(), &format!("m{}", i)).await.unwrap();
        }
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();
        assert_eq!(live.messages().len(), 2);

        assert_eq!(live.load_older().await.unwrap(), 2);
        assert_eq!(live.load_older().await.unwrap(), 1);
        assert!(!live.has_older());
        let texts: Vec<_> = live.messages().iter().map(|m| m.value.content.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_close_detaches_subscription() {
        let fx = fixture(20);
        let conv = fx.conversations.create(None, None).await.unwrap();
        let mut live = LiveConversation::open(conv.id, fx.messages.clone(), fx.store.as_ref(), false)
            .await
            .unwrap();
        assert!(live.is_live());
        live.close().await;
        assert!(!live.is_live());
        assert!(live.next_change().await.is_none());
    }
}
