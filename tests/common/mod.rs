use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use voice_journal::auth::SessionContext;
use voice_journal::config::JournalConfig;
use voice_journal::error::{JournalError, Result};
use voice_journal::ids::new_id;
use voice_journal::journal::Journal;
use voice_journal::models::User;
use voice_journal::providers::{
    AudioClip, ChatCompletion, ChatTurn, CompletionResponse, Transcriber,
};
use voice_journal::storage::{SqliteStore, UserStore};

#[allow(dead_code)]
pub fn create_temp_store() -> (Arc<SqliteStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("journal.db");
    let store = SqliteStore::new_with_path(db_path).expect("failed to create sqlite store");
    (Arc::new(store), tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("journal.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn write_clip(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"not really audio").expect("failed to write clip");
    path
}

#[allow(dead_code)]
pub fn user(email: &str, name: Option<&str>) -> User {
    User {
        id: new_id(),
        email: email.to_string(),
        display_name: name.map(str::to_string),
    }
}

/// Register `user` in the store and return a local session for them
#[allow(dead_code)]
pub async fn signed_in(store: &SqliteStore, user: &User) -> Arc<SessionContext> {
    store.upsert_user(user).await.expect("failed to upsert user");
    Arc::new(SessionContext::local(user.clone()))
}

#[allow(dead_code)]
pub fn journal(store: Arc<SqliteStore>, chat: Option<Arc<dyn ChatCompletion>>) -> Journal {
    Journal::new(store, chat, &JournalConfig::default())
}

/// Chat model answering every request with a fixed reply, or failing
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeChat {
    reply: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatTurn>>>,
}

#[allow(dead_code)]
impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<ChatTurn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(turns.to_vec());
        match &self.reply {
            Some(reply) => Ok(CompletionResponse::new(reply.clone())),
            None => Err(JournalError::Provider("chat unavailable".to_string()).into()),
        }
    }
}

/// Transcriber returning a fixed text, or failing
#[allow(dead_code)]
pub struct FakeTranscriber {
    text: Option<String>,
}

#[allow(dead_code)]
impl FakeTranscriber {
    pub fn hearing(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> Result<String> {
        match &self.text {
            Some(text) => Ok(text.clone()),
            None => Err(JournalError::Api {
                status: 500,
                message: "transcription failed".to_string(),
            }
            .into()),
        }
    }
}
