//! Voice Journal - voice journaling client library
//!
//! This library records spoken journal entries, transcribes them, asks a
//! chat model for a reply, and keeps the resulting conversations in a
//! local or hosted store with realtime updates.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `journal`: Conversation and message repositories, realtime merge, and
//!   the recording pipeline
//! - `groups`: Group chats between registered users
//! - `profile`: Display name management
//! - `auth`: Hosted authentication and the session context
//! - `storage`: Store traits with SQLite and REST implementations
//! - `realtime`: Insert notifications over the Phoenix websocket protocol
//! - `providers`: Chat completion, transcription and speech synthesis
//! - `device`: Microphone and audio output
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voice_journal::config::Config;
//! use voice_journal::journal::Journal;
//! use voice_journal::storage::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let store = Arc::new(SqliteStore::new()?);
//!     let journal = Journal::new(store, None, &config.journal);
//!     let conversation = journal.conversations.create(Some("Morning pages"), None).await?;
//!     journal
//!         .messages
//!         .append(conversation.id, config.backend.local_user.id, "Slept well")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod groups;
pub mod ids;
pub mod journal;
pub mod models;
pub mod profile;
pub mod providers;
pub mod realtime;
pub mod storage;

// Re-export commonly used types
pub use alert::{Alert, AlertSink};
pub use auth::SessionContext;
pub use config::Config;
pub use error::{JournalError, Result};
pub use journal::{Journal, RecordingPipeline};
