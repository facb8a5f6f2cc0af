//! Profile management for the signed-in user

use std::sync::Arc;

use crate::auth::SessionContext;
use crate::error::{JournalError, Result};
use crate::models::User;
use crate::storage::Store;

/// Read and edit the signed-in user's profile
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn Store>,
    session: Arc<SessionContext>,
}

impl ProfileService {
    /// Create the service
    pub fn new(store: Arc<dyn Store>, session: Arc<SessionContext>) -> Self {
        Self { store, session }
    }

    /// The stored profile, or the session's copy when no row exists yet
    pub async fn current(&self) -> Result<User> {
        let user = self.session.require_user()?;
        Ok(self.store.get_user(user.id).await?.unwrap_or(user))
    }

    /// Change the display name
    ///
    /// In hosted mode the auth metadata is patched first, then the `users`
    /// row and the cached session user.
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Validation` when the trimmed name is empty.
    pub async fn update_display_name(&self, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JournalError::Validation("Name cannot be empty".to_string()).into());
        }
        let user = self.session.require_user()?;

        if let Some(auth) = self.session.auth_client() {
            auth.update_user_metadata(serde_json::json!({ "full_name": name }))
                .await?;
        }

        if self.store.get_user(user.id).await?.is_some() {
            self.store.update_display_name(user.id, name).await?;
        } else {
            self.store
                .upsert_user(&User {
                    display_name: Some(name.to_string()),
                    ..user.clone()
                })
                .await?;
        }
        self.session.set_display_name(name);

        tracing::info!("Updated display name for {}", user.id);
        self.session.require_user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use crate::storage::{SqliteStore, UserStore};
    use tempfile::tempdir;

    fn service() -> (ProfileService, Arc<SqliteStore>, User, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::new_with_path(dir.path().join("j.db")).unwrap());
        let user = User {
            id: new_id(),
            email: "me@example.com".to_string(),
            display_name: None,
        };
        let session = Arc::new(SessionContext::local(user.clone()));
        (ProfileService::new(store.clone(), session), store, user, dir)
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let (profile, _store, _user, _dir) = service();
        let err = profile.update_display_name("  ").await.unwrap_err();
        assert_eq!(err.to_string(), "Name cannot be empty");
    }

    #[tokio::test]
    async fn test_update_creates_missing_row() {
        let (profile, store, user, _dir) = service();
        let updated = profile.update_display_name(" Ada ").await.unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ada"));

        let row = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(row.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_update_existing_row() {
        let (profile, store, user, _dir) = service();
        store.upsert_user(&user).await.unwrap();
        profile.update_display_name("Grace").await.unwrap();
        assert_eq!(profile.current().await.unwrap().name_or_unknown(), "Grace");
    }
}
