//! Key/value persistence for the transcript and session preferences.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

use crate::core::constants::{
    STORE_KEY_CONVERSATION_ID, STORE_KEY_MESSAGES, STORE_KEY_SELECTED_MODEL,
};
use crate::core::message::Message;
use crate::core::session::ChatSession;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store persist failed: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Writes several keys as one update. Stores backed by a single file
    /// override this to rewrite it once.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object on disk, rewritten atomically on every `set`.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn open_default() -> Result<Self, StoreError> {
        let dirs = ProjectDirs::from("org", "parley", "parley")
            .ok_or_else(|| StoreError::Unavailable("no data directory".to_string()))?;
        Self::open(dirs.data_dir().join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(&self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }

    fn set_many(&self, updates: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        for (key, value) in updates {
            entries.insert(key.to_string(), value.to_string());
        }
        self.write(&entries)
    }
}

/// Writes the session snapshot. Failures are logged and otherwise ignored;
/// in-memory state is never rolled back.
pub fn save_session(store: &dyn KeyValueStore, session: &ChatSession) {
    let messages = match serde_json::to_string(session.messages()) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to encode transcript");
            return;
        }
    };
    // An empty model id records "no selection" so a reset survives restarts
    let selected_model = session.selected_model.as_deref().unwrap_or_default();
    let writes = [
        (STORE_KEY_MESSAGES, messages.as_str()),
        (STORE_KEY_CONVERSATION_ID, session.conversation_id()),
        (STORE_KEY_SELECTED_MODEL, selected_model),
    ];
    if let Err(err) = store.set_many(&writes) {
        warn!(error = %err, "failed to persist session state");
    }
}

/// Restores a session written by [`save_session`], or starts a fresh one.
/// A corrupt transcript is dropped rather than failing startup.
pub fn load_session(store: &dyn KeyValueStore) -> ChatSession {
    let messages: Vec<Message> = store
        .get(STORE_KEY_MESSAGES)
        .and_then(|json| match serde_json::from_str(&json) {
            Ok(messages) => Some(messages),
            Err(err) => {
                warn!(error = %err, "discarding unreadable transcript");
                None
            }
        })
        .unwrap_or_default();

    let mut session = match store.get(STORE_KEY_CONVERSATION_ID) {
        Some(id) if !id.is_empty() => ChatSession::restore(id, messages),
        _ => {
            let fresh = ChatSession::new();
            let id = fresh.conversation_id().to_string();
            ChatSession::restore(id, messages)
        }
    };
    session.selected_model = store
        .get(STORE_KEY_SELECTED_MODEL)
        .filter(|model| !model.is_empty());
    session
}
