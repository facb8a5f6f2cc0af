//! Realtime row-insert notifications
//!
//! A [`ChangeFeed`] turns "rows inserted into table X matching filter F"
//! into a [`Subscription`], a stream of [`RowChange`] values backed by a
//! background task. Implementations:
//!
//! - [`phoenix::RealtimeClient`] -- the hosted realtime websocket service
//!   (Phoenix channel protocol).
//! - [`crate::storage::SqliteStore`] -- publishes its own inserts
//!   in-process.
//!
//! A subscription stays live until [`Subscription::unsubscribe`] is called
//! or the value is dropped; there is no other cleanup path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Result;

pub mod phoenix;

pub use phoenix::RealtimeClient;

/// An inserted row delivered by a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    /// Table the row was inserted into
    pub table: String,
    /// The new row as returned by the store
    pub record: serde_json::Value,
}

/// Equality filter on one column, `column=eq.value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    /// Column name as it appears in the record
    pub column: String,
    /// Expected value, compared as text
    pub value: String,
}

impl RowFilter {
    /// Build an equality filter
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::realtime::RowFilter;
    ///
    /// let filter = RowFilter::eq("conversationId", "abc");
    /// assert_eq!(filter.to_filter_string(), "conversationId=eq.abc");
    /// ```
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Filter expression understood by the hosted realtime service
    pub fn to_filter_string(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Whether `record` satisfies the filter
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        match record.get(&self.column) {
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case(&self.value),
            Some(serde_json::Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// Source of row-insert notifications
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to inserts into `table`, optionally filtered
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Realtime` if the subscription cannot be
    /// established.
    async fn subscribe(&self, table: &str, filter: Option<RowFilter>) -> Result<Subscription>;
}

/// A live subscription
///
/// Dropping the subscription stops its background task.
#[derive(Debug)]
pub struct Subscription {
    changes: mpsc::UnboundedReceiver<RowChange>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a receiver fed by `task`
    ///
    /// `shutdown`, when present, asks the task to leave gracefully before
    /// it is awaited by [`Subscription::unsubscribe`].
    pub fn new(
        changes: mpsc::UnboundedReceiver<RowChange>,
        shutdown: Option<oneshot::Sender<()>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            changes,
            shutdown,
            task: Some(task),
        }
    }

    /// Wait for the next insert; `None` once the feed has ended
    pub async fn next(&mut self) -> Option<RowChange> {
        self.changes.recv().await
    }

    /// Next insert if one is already buffered
    pub fn try_next(&mut self) -> Option<RowChange> {
        self.changes.try_recv().ok()
    }

    /// Whether the background task is still running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the subscription and wait for its task to finish
    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        } else if let Some(task) = self.task.as_ref() {
            task.abort();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!("Realtime subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
