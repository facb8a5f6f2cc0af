//! Session persistence via the OS keyring
//!
//! The serialized [`AuthSession`] is stored as one keyring entry so a
//! restart can restore the signed-in user without asking for credentials.

use std::sync::Mutex;

use super::AuthSession;
use crate::error::{JournalError, Result};

const SERVICE: &str = "voice-journal";

/// Where the current session is kept between runs
pub trait SessionPersistence: Send + Sync {
    /// Persisted session, if any
    fn load(&self) -> Result<Option<AuthSession>>;

    /// Persist `session`, replacing any previous one
    fn save(&self, session: &AuthSession) -> Result<()>;

    /// Forget the persisted session; a no-op when none exists
    fn clear(&self) -> Result<()>;
}

/// Keyring-backed persistence, one entry per project URL
pub struct KeyringSessionStore {
    account: String,
}

impl KeyringSessionStore {
    /// Store sessions for the project at `project_url`
    pub fn new(project_url: &str) -> Self {
        Self {
            account: project_url.trim_end_matches('/').to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(SERVICE, &self.account).map_err(JournalError::Keyring)?)
    }
}

impl SessionPersistence for KeyringSessionStore {
    fn load(&self) -> Result<Option<AuthSession>> {
        match self.entry()?.get_password() {
            Ok(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(JournalError::Keyring(e).into()),
        }
    }

    fn save(&self, session: &AuthSession) -> Result<()> {
        let json_str = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&json_str)
            .map_err(JournalError::Keyring)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(JournalError::Keyring(e).into()),
        }
    }
}

/// In-process persistence for tests and the local backend
#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<AuthSession>>,
}

impl SessionPersistence for MemorySessionStore {
    fn load(&self) -> Result<Option<AuthSession>> {
        Ok(self.session.lock().map(|s| s.clone()).unwrap_or(None))
    }

    fn save(&self, session: &AuthSession) -> Result<()> {
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some(session.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut guard) = self.session.lock() {
            *guard = None;
        }
        Ok(())
    }
}
