//! Local SQLite backend
//!
//! Mirrors the hosted tables in a single database file so the journal works
//! offline. Inserts into `messages`, `chats` and `chat_messages` are also
//! published on an in-process channel, which makes the store its own
//! realtime feed.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{
    ConversationFilter, ConversationStore, GroupStore, MessageStore, MessageWindow, UserStore,
};
use crate::error::{JournalError, Result};
use crate::models::{
    ChatMessage, Conversation, ConversationPatch, GroupChat, GroupMember, Message, User,
};
use crate::realtime::{ChangeFeed, RowChange, RowFilter, Subscription};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT
);
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    chat_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_date TEXT NOT NULL,
    last_message TEXT,
    preview TEXT,
    owner_id TEXT
);
CREATE INDEX IF NOT EXISTS conversations_last_date_idx ON conversations(last_date);
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    sender_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_conversation_idx ON messages(conversation_id, created_at);
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS group_members (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    user_id TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    UNIQUE (chat_id, user_id)
);
CREATE TABLE IF NOT EXISTS chat_messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS chat_messages_chat_idx ON chat_messages(chat_id, created_at);
";

const CONVERSATION_COLUMNS: &str =
    "id, chat_name, created_at, last_date, last_message, preview, owner_id";

/// Local storage backend
pub struct SqliteStore {
    db_path: PathBuf,
    changes: broadcast::Sender<RowChange>,
}

impl SqliteStore {
    /// Create a store in the user's data directory
    ///
    /// `JOURNAL_DB_PATH` overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("JOURNAL_DB_PATH") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "voicejournal", "voice-journal")
            .ok_or_else(|| JournalError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("journal.db"))
    }

    /// Create a store backed by the given database file
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::storage::SqliteStore;
    ///
    /// let dir = std::env::temp_dir().join("voice-journal-doc");
    /// let store = SqliteStore::new_with_path(dir.join("journal.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let (changes, _) = broadcast::channel(256);
        let store = Self { db_path, changes };
        store.init()?;
        tracing::debug!("Opened local journal database at {}", store.db_path.display());
        Ok(store)
    }

    /// Path of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| storage_error("Failed to create tables", e))?;
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| storage_error("Failed to open database", e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| storage_error("Failed to enable foreign keys", e))?;
        Ok(conn)
    }

    fn publish<T: serde::Serialize>(&self, table: &str, row: &T) {
        match serde_json::to_value(row) {
            Ok(record) => {
                // No receivers is the common case.
                let _ = self.changes.send(RowChange {
                    table: table.to_string(),
                    record,
                });
            }
            Err(e) => tracing::warn!("Failed to serialize {} row for feed: {}", table, e),
        }
    }
}

fn storage_error(context: &str, err: rusqlite::Error) -> anyhow::Error {
    JournalError::Storage(format!("{}: {}", context, err)).into()
}

fn ts(value: &DateTime<Utc>) -> String {
    // Fixed width so lexical order equals time order.
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| Uuid::parse_str(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        created_at: ts_col(row, 2)?,
        last_activity: ts_col(row, 3)?,
        last_message: row.get(4)?,
        preview: row.get(5)?,
        owner_id: opt_uuid_col(row, 6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        sender_id: uuid_col(row, 2)?,
        content: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<GroupChat> {
    Ok(GroupChat {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        created_at: ts_col(row, 2)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<GroupMember> {
    Ok(GroupMember {
        id: uuid_col(row, 0)?,
        chat_id: uuid_col(row, 1)?,
        user_id: uuid_col(row, 2)?,
        joined_at: ts_col(row, 3)?,
    })
}

fn chat_message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: uuid_col(row, 0)?,
        chat_id: uuid_col(row, 1)?,
        user_id: uuid_col(row, 2)?,
        text: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO conversations (id, chat_name, created_at, last_date, last_message, preview, owner_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                conversation.id.to_string(),
                conversation.name,
                ts(&conversation.created_at),
                ts(&conversation.last_activity),
                conversation.last_message,
                conversation.preview,
                conversation.owner_id.map(|id| id.to_string()),
            ],
        )
        .map_err(|e| storage_error("Failed to insert conversation", e))?;
        Ok(conversation.clone())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT {} FROM conversations WHERE id = ?",
            CONVERSATION_COLUMNS
        );
        conn.query_row(&sql, params![id.to_string()], conversation_from_row)
            .optional()
            .map_err(|e| storage_error("Failed to query conversation", e))
    }

    async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let conn = self.open()?;

        let mut sql = format!("SELECT {} FROM conversations WHERE 1 = 1", CONVERSATION_COLUMNS);
        let mut args: Vec<String> = Vec::new();
        if let Some(owner) = filter.owner {
            sql.push_str(" AND owner_id = ?");
            args.push(owner.to_string());
        }
        if let Some((start, end)) = filter.day_bounds() {
            sql.push_str(" AND last_date >= ? AND last_date < ?");
            args.push(ts(&start));
            args.push(ts(&end));
        }
        sql.push_str(" ORDER BY last_date DESC");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), conversation_from_row)
            .map_err(|e| storage_error("Failed to query conversations", e))?;

        let mut conversations = Vec::new();
        for row in rows {
            let conversation = row.map_err(|e| storage_error("Failed to read conversation", e))?;
            if filter.matches(&conversation) {
                conversations.push(conversation);
            }
        }
        Ok(conversations)
    }

    async fn update_conversation(&self, id: Uuid, patch: &ConversationPatch) -> Result<()> {
        let mut sets: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(name) = &patch.name {
            sets.push("chat_name = ?");
            args.push(name.clone());
        }
        if let Some(last_message) = &patch.last_message {
            sets.push("last_message = ?");
            args.push(last_message.clone());
        }
        if let Some(preview) = &patch.preview {
            sets.push("preview = ?");
            args.push(preview.clone());
        }
        if let Some(last_activity) = &patch.last_activity {
            sets.push("last_date = ?");
            args.push(ts(last_activity));
        }
        if sets.is_empty() {
            return Ok(());
        }
        args.push(id.to_string());

        let conn = self.open()?;
        let sql = format!("UPDATE conversations SET {} WHERE id = ?", sets.join(", "));
        let changed = conn
            .execute(&sql, params_from_iter(args.iter()))
            .map_err(|e| storage_error("Failed to update conversation", e))?;
        if changed == 0 {
            return Err(JournalError::NotFound(format!("Conversation {} not found", id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: &Message) -> Result<Message> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                ts(&message.created_at),
            ],
        )
        .map_err(|e| storage_error("Failed to insert message", e))?;
        self.publish("messages", message);
        Ok(message.clone())
    }

    async fn list_messages_desc(
        &self,
        conversation_id: Uuid,
        window: MessageWindow,
    ) -> Result<Vec<Message>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages WHERE conversation_id = ?
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ? OFFSET ?",
            )
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(
                params![
                    conversation_id.to_string(),
                    window.limit as i64,
                    window.offset as i64
                ],
                message_from_row,
            )
            .map_err(|e| storage_error("Failed to query messages", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error("Failed to read message", e))
    }

    async fn list_all_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages WHERE conversation_id = ?
                 ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![conversation_id.to_string()], message_from_row)
            .map_err(|e| storage_error("Failed to query messages", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error("Failed to read message", e))
    }

    async fn count_messages(&self, conversation_id: Uuid) -> Result<usize> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
                params![conversation_id.to_string()],
                |r| r.get(0),
            )
            .map_err(|e| storage_error("Failed to count messages", e))?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, email, full_name FROM users WHERE id = ?",
            params![id.to_string()],
            user_from_row,
        )
        .optional()
        .map_err(|e| storage_error("Failed to query user", e))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, email, full_name FROM users WHERE email = ?",
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(|e| storage_error("Failed to query user", e))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.open()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, email, full_name FROM users WHERE id IN ({})",
            placeholders
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(
                params_from_iter(ids.iter().map(|id| id.to_string())),
                user_from_row,
            )
            .map_err(|e| storage_error("Failed to query users", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error("Failed to read user", e))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (id, email, full_name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                full_name = COALESCE(excluded.full_name, users.full_name)",
            params![user.id.to_string(), user.email, user.display_name],
        )
        .map_err(|e| storage_error("Failed to upsert user", e))?;
        Ok(())
    }

    async fn update_display_name(&self, id: Uuid, name: &str) -> Result<()> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE users SET full_name = ? WHERE id = ?",
                params![name, id.to_string()],
            )
            .map_err(|e| storage_error("Failed to update user", e))?;
        if changed == 0 {
            return Err(JournalError::NotFound(format!("User {} not found", id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl GroupStore for SqliteStore {
    async fn insert_chat(&self, chat: &GroupChat) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO chats (id, name, created_at) VALUES (?, ?, ?)",
            params![chat.id.to_string(), chat.name, ts(&chat.created_at)],
        )
        .map_err(|e| storage_error("Failed to insert chat", e))?;
        self.publish("chats", chat);
        Ok(())
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<GroupChat>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, name, created_at FROM chats WHERE id = ?",
            params![id.to_string()],
            chat_from_row,
        )
        .optional()
        .map_err(|e| storage_error("Failed to query chat", e))
    }

    async fn insert_member(&self, member: &GroupMember) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO group_members (id, chat_id, user_id, joined_at) VALUES (?, ?, ?, ?)",
            params![
                member.id.to_string(),
                member.chat_id.to_string(),
                member.user_id.to_string(),
                ts(&member.joined_at),
            ],
        )
        .map_err(|e| storage_error("Failed to insert group member", e))?;
        Ok(())
    }

    async fn find_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, chat_id, user_id, joined_at FROM group_members
             WHERE chat_id = ? AND user_id = ?",
            params![chat_id.to_string(), user_id.to_string()],
            member_from_row,
        )
        .optional()
        .map_err(|e| storage_error("Failed to query group member", e))
    }

    async fn list_members(&self, chat_id: Uuid) -> Result<Vec<GroupMember>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, user_id, joined_at FROM group_members
                 WHERE chat_id = ? ORDER BY joined_at ASC, rowid ASC",
            )
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![chat_id.to_string()], member_from_row)
            .map_err(|e| storage_error("Failed to query group members", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error("Failed to read group member", e))
    }

    async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<GroupChat>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.name, c.created_at FROM chats c
                 JOIN group_members m ON m.chat_id = c.id
                 WHERE m.user_id = ?
                 ORDER BY c.created_at DESC",
            )
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![user_id.to_string()], chat_from_row)
            .map_err(|e| storage_error("Failed to query chats", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error("Failed to read chat", e))
    }

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO chat_messages (id, chat_id, user_id, text, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.user_id.to_string(),
                message.text,
                ts(&message.created_at),
            ],
        )
        .map_err(|e| storage_error("Failed to insert chat message", e))?;
        self.publish("chat_messages", message);
        Ok(())
    }

    async fn list_chat_messages(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, user_id, text, created_at FROM chat_messages
                 WHERE chat_id = ? ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![chat_id.to_string()], chat_message_from_row)
            .map_err(|e| storage_error("Failed to query chat messages", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error("Failed to read chat message", e))
    }

    async fn latest_chat_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, chat_id, user_id, text, created_at FROM chat_messages
             WHERE chat_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
            params![chat_id.to_string()],
            chat_message_from_row,
        )
        .optional()
        .map_err(|e| storage_error("Failed to query chat message", e))
    }
}

#[async_trait]
impl ChangeFeed for SqliteStore {
    async fn subscribe(&self, table: &str, filter: Option<RowFilter>) -> Result<Subscription> {
        let mut inserts = self.changes.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let table = table.to_string();

        let task = tokio::spawn(async move {
            loop {
                match inserts.recv().await {
                    Ok(change) => {
                        if change.table != table {
                            continue;
                        }
                        if let Some(filter) = &filter {
                            if !filter.matches(&change.record) {
                                continue;
                            }
                        }
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Local feed lagged, {} inserts skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx, None, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use chrono::Duration;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let store =
            SqliteStore::new_with_path(dir.path().join("journal.db")).expect("failed to create store");
        (store, dir)
    }

    #[test]
    fn test_init_creates_tables() {
        let (store, _dir) = create_test_store();
        let conn = Connection::open(store.db_path()).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('users','conversations','messages','chats','group_members','chat_messages')",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 6);
    }

    #[tokio::test]
    async fn test_conversation_roundtrip_and_update() {
        let (store, _dir) = create_test_store();
        let conv = Conversation::new("New Voice Chat", Some(new_id()));
        store.insert_conversation(&conv).await.unwrap();

        let later = conv.last_activity + Duration::seconds(5);
        store
            .update_conversation(
                conv.id,
                &ConversationPatch {
                    last_message: Some("hello".to_string()),
                    preview: Some("hello".to_string()),
                    last_activity: Some(later),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let loaded = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "New Voice Chat");
        assert_eq!(loaded.last_message.as_deref(), Some("hello"));
        assert_eq!(loaded.last_activity, later);
        assert_eq!(loaded.owner_id, conv.owner_id);
    }

    #[tokio::test]
    async fn test_update_missing_conversation_is_not_found() {
        let (store, _dir) = create_test_store();
        let err = store
            .update_conversation(
                new_id(),
                &ConversationPatch {
                    name: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            crate::error::kind_of(&err),
            Some(JournalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_message_requires_existing_conversation() {
        let (store, _dir) = create_test_store();
        let orphan = Message::new(new_id(), new_id(), "lost");
        let err = store.insert_message(&orphan).await.unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"));
    }

    #[tokio::test]
    async fn test_list_conversations_orders_by_activity() {
        let (store, _dir) = create_test_store();
        let mut older = Conversation::new("older", None);
        older.last_activity = older.last_activity - Duration::hours(2);
        let newer = Conversation::new("newer", None);
        store.insert_conversation(&older).await.unwrap();
        store.insert_conversation(&newer).await.unwrap();

        let listed = store
            .list_conversations(&ConversationFilter::default())
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_member_uniqueness_enforced() {
        let (store, _dir) = create_test_store();
        let chat = GroupChat {
            id: new_id(),
            name: "Friends".to_string(),
            created_at: crate::ids::now(),
        };
        store.insert_chat(&chat).await.unwrap();

        let user_id = new_id();
        let member = GroupMember {
            id: new_id(),
            chat_id: chat.id,
            user_id,
            joined_at: crate::ids::now(),
        };
        store.insert_member(&member).await.unwrap();

        let dup = GroupMember {
            id: new_id(),
            ..member.clone()
        };
        assert!(store.insert_member(&dup).await.is_err());
        assert_eq!(store.list_members(chat.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feed_delivers_filtered_inserts() {
        let (store, _dir) = create_test_store();
        let conv_a = Conversation::new("a", None);
        let conv_b = Conversation::new("b", None);
        store.insert_conversation(&conv_a).await.unwrap();
        store.insert_conversation(&conv_b).await.unwrap();

        let mut sub = store
            .subscribe("messages", Some(RowFilter::eq("conversationId", conv_a.id)))
            .await
            .unwrap();

        store
            .insert_message(&Message::new(conv_b.id, new_id(), "other"))
            .await
            .unwrap();
        let mine = Message::new(conv_a.id, new_id(), "mine");
        store.insert_message(&mine).await.unwrap();

        let change = sub.next().await.unwrap();
        let received: Message = serde_json::from_value(change.record).unwrap();
        assert_eq!(received, mine);
    }

    #[tokio::test]
    async fn test_users_by_ids_skips_missing() {
        let (store, _dir) = create_test_store();
        let user = User {
            id: new_id(),
            email: "sam@example.com".to_string(),
            display_name: Some("Sam".to_string()),
        };
        store.upsert_user(&user).await.unwrap();

        let found = store.users_by_ids(&[user.id, new_id()]).await.unwrap();
        assert_eq!(found, vec![user.clone()]);
        assert_eq!(
            store.find_user_by_email("sam@example.com").await.unwrap(),
            Some(user)
        );
    }
}
