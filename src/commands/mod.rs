/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `auth`: Sign in, sign up, sign out
- `journal`: New conversations, history, recording and live view
- `groups`: Group chats
- `profile`: Display name

Every handler receives an [`App`], which holds the store, realtime feed and
session built for the configured backend.
*/

use std::io::Write as _;
use std::sync::Arc;

use crate::alert::{Alert, AlertSink, ConsoleAlertSink};
use crate::auth::{AuthClient, KeyringSessionStore, SessionContext};
use crate::config::{BackendKind, Config};
use crate::error::{JournalError, Result};
use crate::models::User;
use crate::realtime::{ChangeFeed, RealtimeClient};
use crate::storage::{RestStore, SqliteStore, Store, UserStore};

pub mod auth;
pub mod groups;
pub mod journal;
pub mod profile;

/// Everything a command needs, built once per invocation
pub struct App {
    /// Loaded configuration
    pub config: Config,
    /// Data store for the configured backend
    pub store: Arc<dyn Store>,
    /// Realtime insert notifications
    pub feed: Arc<dyn ChangeFeed>,
    /// Signed-in user
    pub session: Arc<SessionContext>,
    /// Where user-facing alerts go
    pub alerts: Arc<dyn AlertSink>,
}

impl App {
    /// Build the store, feed and session for `config.backend`
    ///
    /// The hosted backend restores the persisted session; the local
    /// backend is always signed in as the configured local user.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or the clients cannot be
    /// created.
    pub async fn connect(config: Config) -> Result<Self> {
        match config.backend.kind {
            BackendKind::Local => Self::connect_local(config).await,
            BackendKind::Supabase => Self::connect_hosted(config).await,
        }
    }

    async fn connect_local(config: Config) -> Result<Self> {
        let store = Arc::new(match &config.backend.db_path {
            Some(path) => SqliteStore::new_with_path(path.clone())?,
            None => SqliteStore::new()?,
        });

        let local = &config.backend.local_user;
        let user = match store.get_user(local.id).await? {
            Some(user) => user,
            None => {
                let user = User {
                    id: local.id,
                    email: local.email.clone(),
                    display_name: local.name.clone(),
                };
                store.upsert_user(&user).await?;
                user
            }
        };
        tracing::info!("Using local backend at {}", store.db_path().display());

        Ok(Self {
            session: Arc::new(SessionContext::local(user)),
            store: store.clone(),
            feed: store,
            alerts: Arc::new(ConsoleAlertSink),
            config,
        })
    }

    async fn connect_hosted(config: Config) -> Result<Self> {
        let url = config
            .backend
            .url
            .clone()
            .ok_or_else(|| JournalError::Config("backend.url is required".to_string()))?;
        let anon_key = config
            .backend
            .anon_key
            .clone()
            .ok_or_else(|| JournalError::Config("backend.anon_key is required".to_string()))?;

        let auth = AuthClient::new(&url, &anon_key, config.http.timeout_seconds)?;
        let session = Arc::new(SessionContext::hosted(
            auth,
            Arc::new(KeyringSessionStore::new(&url)),
        ));
        session.init().await?;

        let store = RestStore::new(&url, &anon_key, session.token(), config.http.timeout_seconds)?;
        let feed = RealtimeClient::new(&url, &anon_key, session.token())?;
        tracing::info!("Using hosted backend at {}", url);

        Ok(Self {
            session,
            store: Arc::new(store),
            feed: Arc::new(feed),
            alerts: Arc::new(ConsoleAlertSink),
            config,
        })
    }

    /// Report a failed flow as an alert and keep the error for the exit code
    pub fn report(&self, error: anyhow::Error, fallback: &str) -> anyhow::Error {
        tracing::error!("{}: {:#}", fallback, error);
        self.alerts.alert(Alert::from_error(&error, fallback));
        error
    }
}

/// Read a line from stdin after printing `prompt`
pub(crate) async fn prompt_line(prompt: &str) -> Result<String> {
    let prompt = prompt.to_string();
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        eprint!("{}", prompt);
        std::io::stderr().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .map_err(|e| JournalError::Device(format!("Input task failed: {}", e)))??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConversationStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_connect_local_registers_user() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.backend.db_path = Some(dir.path().join("journal.db"));
        config.backend.local_user.name = Some("Local".to_string());

        let app = App::connect(config.clone()).await.unwrap();
        let user = app.session.require_user().unwrap();
        assert_eq!(user.id, config.backend.local_user.id);
        assert_eq!(
            app.store.get_user(user.id).await.unwrap().unwrap().name_or_unknown(),
            "Local"
        );
        assert!(app.store.get_conversation(crate::ids::new_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_hosted_requires_url() {
        let mut config = Config::default();
        config.backend.kind = BackendKind::Supabase;
        assert!(App::connect(config).await.is_err());
    }
}
