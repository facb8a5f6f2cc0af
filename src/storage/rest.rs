//! Hosted backend over the Postgres REST gateway
//!
//! Rows are read and written as JSON through `/rest/v1/<table>`. Filters use
//! the gateway's query syntax (`col=eq.value`, `col=in.(a,b)`, ...). Every
//! request carries the project key and the signed-in user's bearer token,
//! falling back to the project key when nobody is signed in.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use super::{
    ConversationFilter, ConversationStore, GroupStore, MessageStore, MessageWindow, UserStore,
};
use crate::auth::BearerToken;
use crate::error::{JournalError, Result};
use crate::models::{
    ChatMessage, Conversation, ConversationPatch, GroupChat, GroupMember, Message, User,
};

/// REST gateway client implementing every store trait
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    anon_key: String,
    token: BearerToken,
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl RestStore {
    /// Create a store for the project at `base_url`
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::auth::BearerToken;
    /// use voice_journal::storage::RestStore;
    ///
    /// let store = RestStore::new("https://project.supabase.co", "anon-key", BearerToken::new(), 30);
    /// assert!(store.is_ok());
    /// ```
    pub fn new(
        base_url: &str,
        anon_key: &str,
        token: BearerToken,
        timeout_seconds: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("voice-journal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JournalError::Storage(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized REST store: url={}", base_url);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            token,
        })
    }

    fn table(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self.token.get().unwrap_or_else(|| self.anon_key.clone());
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        tracing::debug!("GET {} {:?}", table, query);
        let response = self
            .authorize(self.client.get(self.table(table)))
            .query(query)
            .send()
            .await
            .map_err(JournalError::Http)?;
        let response = check(table, response).await?;
        response.json::<Vec<T>>().await.map_err(|e| {
            JournalError::Storage(format!("Failed to parse {} rows: {}", table, e)).into()
        })
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut query = query.to_vec();
        query.push(("limit", "1".to_string()));
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<Response> {
        tracing::debug!("POST {}", table);
        let response = self
            .authorize(self.client.post(self.table(table)))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(JournalError::Http)?;
        check(table, response).await
    }

    async fn patch<T: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &T,
    ) -> Result<Vec<serde_json::Value>> {
        tracing::debug!("PATCH {} {:?}", table, query);
        let response = self
            .authorize(self.client.patch(self.table(table)))
            .header("Prefer", "return=representation")
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(JournalError::Http)?;
        let response = check(table, response).await?;
        response.json().await.map_err(|e| {
            JournalError::Storage(format!("Failed to parse {} update: {}", table, e)).into()
        })
    }
}

async fn check(table: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("REST gateway returned error {} for {}: {}", status, table, body);
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(JournalError::Api {
        status: status.as_u16(),
        message,
    }
    .into())
}

async fn first_row<T: DeserializeOwned>(table: &str, response: Response) -> Result<T> {
    let rows: Vec<T> = response.json().await.map_err(|e| {
        JournalError::Storage(format!("Failed to parse inserted {} row: {}", table, e))
    })?;
    rows.into_iter().next().ok_or_else(|| {
        JournalError::Storage(format!("Insert into {} returned no row", table)).into()
    })
}

#[async_trait]
impl ConversationStore for RestStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        let response = self.insert("conversations", conversation).await?;
        first_row("conversations", response).await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.select_one("conversations", &[("select", "*".to_string()), ("id", eq(id))])
            .await
    }

    async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "lastDate.desc".to_string()),
        ];
        if let Some(owner) = filter.owner {
            query.push(("ownerId", eq(owner)));
        }
        if let Some((start, end)) = filter.day_bounds() {
            query.push(("lastDate", format!("gte.{}", ts(&start))));
            query.push(("lastDate", format!("lt.{}", ts(&end))));
        }

        let rows: Vec<Conversation> = self.select("conversations", &query).await?;
        Ok(rows.into_iter().filter(|c| filter.matches(c)).collect())
    }

    async fn update_conversation(&self, id: Uuid, patch: &ConversationPatch) -> Result<()> {
        let updated = self
            .patch("conversations", &[("id", eq(id))], patch)
            .await?;
        if updated.is_empty() {
            return Err(JournalError::NotFound(format!("Conversation {} not found", id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for RestStore {
    async fn insert_message(&self, message: &Message) -> Result<Message> {
        let response = self.insert("messages", message).await?;
        first_row("messages", response).await
    }

    async fn list_messages_desc(
        &self,
        conversation_id: Uuid,
        window: MessageWindow,
    ) -> Result<Vec<Message>> {
        self.select(
            "messages",
            &[
                ("select", "*".to_string()),
                ("conversationId", eq(conversation_id)),
                ("order", "createdAt.desc".to_string()),
                ("limit", window.limit.to_string()),
                ("offset", window.offset.to_string()),
            ],
        )
        .await
    }

    async fn list_all_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.select(
            "messages",
            &[
                ("select", "*".to_string()),
                ("conversationId", eq(conversation_id)),
                ("order", "createdAt.asc".to_string()),
            ],
        )
        .await
    }

    async fn count_messages(&self, conversation_id: Uuid) -> Result<usize> {
        let response = self
            .authorize(self.client.get(self.table("messages")))
            .header("Prefer", "count=exact")
            .query(&[
                ("select", "id".to_string()),
                ("conversationId", eq(conversation_id)),
            ])
            .send()
            .await
            .map_err(JournalError::Http)?;
        let response = check("messages", response).await?;

        // Content-Range: 0-2/3 or */0
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(total) = total {
            return Ok(total);
        }

        let rows: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            JournalError::Storage(format!("Failed to parse message count: {}", e))
        })?;
        Ok(rows.len())
    }
}

#[async_trait]
impl UserStore for RestStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.select_one("users", &[("select", "*".to_string()), ("id", eq(id))])
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.select_one("users", &[("select", "*".to_string()), ("email", eq(email))])
            .await
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.select(
            "users",
            &[("select", "*".to_string()), ("id", format!("in.({})", list))],
        )
        .await
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        tracing::debug!("Upserting user row {}", user.id);
        let response = self
            .authorize(self.client.post(self.table("users")))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "id")])
            .json(user)
            .send()
            .await
            .map_err(JournalError::Http)?;
        check("users", response).await?;
        Ok(())
    }

    async fn update_display_name(&self, id: Uuid, name: &str) -> Result<()> {
        let updated = self
            .patch("users", &[("id", eq(id))], &json!({ "full_name": name }))
            .await?;
        if updated.is_empty() {
            return Err(JournalError::NotFound(format!("User {} not found", id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl GroupStore for RestStore {
    async fn insert_chat(&self, chat: &GroupChat) -> Result<()> {
        self.insert("chats", chat).await?;
        Ok(())
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<GroupChat>> {
        self.select_one("chats", &[("select", "*".to_string()), ("id", eq(id))])
            .await
    }

    async fn insert_member(&self, member: &GroupMember) -> Result<()> {
        self.insert("group_members", member).await?;
        Ok(())
    }

    async fn find_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>> {
        self.select_one(
            "group_members",
            &[
                ("select", "*".to_string()),
                ("chat_id", eq(chat_id)),
                ("user_id", eq(user_id)),
            ],
        )
        .await
    }

    async fn list_members(&self, chat_id: Uuid) -> Result<Vec<GroupMember>> {
        self.select(
            "group_members",
            &[
                ("select", "*".to_string()),
                ("chat_id", eq(chat_id)),
                ("order", "joined_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<GroupChat>> {
        let memberships: Vec<GroupMember> = self
            .select(
                "group_members",
                &[("select", "*".to_string()), ("user_id", eq(user_id))],
            )
            .await?;
        if memberships.is_empty() {
            return Ok(Vec::new());
        }
        let list = memberships
            .iter()
            .map(|m| m.chat_id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.select(
            "chats",
            &[
                ("select", "*".to_string()),
                ("id", format!("in.({})", list)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<()> {
        self.insert("chat_messages", message).await?;
        Ok(())
    }

    async fn list_chat_messages(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.select(
            "chat_messages",
            &[
                ("select", "*".to_string()),
                ("chat_id", eq(chat_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn latest_chat_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>> {
        self.select_one(
            "chat_messages",
            &[
                ("select", "*".to_string()),
                ("chat_id", eq(chat_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_filter_format() {
        let id = Uuid::nil();
        assert_eq!(eq(id), "eq.00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_timestamp_format_is_utc_micros() {
        let t = DateTime::parse_from_rfc3339("2025-03-20T10:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ts(&t), "2025-03-20T08:00:00.000000Z");
    }

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store =
            RestStore::new("https://project.supabase.co/", "anon", BearerToken::new(), 5).unwrap();
        assert_eq!(
            store.table("messages"),
            "https://project.supabase.co/rest/v1/messages"
        );
    }
}
