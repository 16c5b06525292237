use hrconnect_core::{keys, ConversationId, HrError, KeyValueStore, Message, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// File-backed key-value store, one JSON object per backend profile.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store for `base_url` under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>, base_url: &str) -> Result<Self> {
        let profile_key = Self::profile_key(base_url);
        let path = data_dir.as_ref().join(&profile_key).join("storage.json");

        debug!("FileStore initialized: path={:?}, profile_key={}", path, profile_key);
        Self::at(path)
    }

    /// Open a store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let json = fs::read_to_string(&path)?;
            if json.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&json).map_err(|e| {
                    HrError::Storage(format!("Corrupt storage file {:?}: {}", path, e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Normalized profile key: hash prefix of the URL plus its readable host.
    fn profile_key(base_url: &str) -> String {
        let normalized = base_url.trim().trim_end_matches('/');

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let host = normalized
            .split("://")
            .nth(1)
            .unwrap_or(normalized)
            .split('/')
            .next()
            .filter(|h| !h.is_empty())
            .unwrap_or("backend");

        let safe_host = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            })
            .collect::<String>();

        format!("{}-{}", &hash[..8], safe_host)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn lock_err() -> HrError {
        HrError::Storage("storage lock poisoned".into())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| Self::lock_err())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::lock_err())?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| FileStore::lock_err())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| FileStore::lock_err())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| FileStore::lock_err())?;
        entries.remove(key);
        Ok(())
    }
}

/// Typed view over the chat keys of a [`KeyValueStore`].
#[derive(Clone)]
pub struct ChatStorage {
    store: Arc<dyn KeyValueStore>,
}

impl ChatStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn conversation_id(&self) -> Result<Option<ConversationId>> {
        let Some(raw) = self.store.get(keys::CONVERSATION_ID)? else {
            return Ok(None);
        };

        match raw.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Some(ConversationId(id))),
            _ => {
                warn!("Ignoring invalid stored conversation id: {:?}", raw);
                Ok(None)
            }
        }
    }

    pub fn set_conversation_id(&self, id: Option<ConversationId>) -> Result<()> {
        match id {
            Some(id) => self.store.set(keys::CONVERSATION_ID, &id.to_string()),
            None => self.store.remove(keys::CONVERSATION_ID),
        }
    }

    pub fn messages(&self) -> Result<Vec<Message>> {
        let Some(raw) = self.store.get(keys::CHAT_MESSAGES)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                warn!("Discarding unreadable stored transcript: {}", e);
                Ok(Vec::new())
            }
        }
    }

    pub fn set_messages(&self, messages: &[Message]) -> Result<()> {
        let json = serde_json::to_string(messages)?;
        self.store.set(keys::CHAT_MESSAGES, &json)
    }

    /// Login id the persisted transcript belongs to.
    pub fn initialized_marker(&self) -> Result<Option<String>> {
        self.store.get(keys::CHAT_INITIALIZED)
    }

    pub fn set_initialized_marker(&self, marker: &str) -> Result<()> {
        self.store.set(keys::CHAT_INITIALIZED, marker)
    }

    /// Drop the transcript and the active conversation id.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(keys::CONVERSATION_ID)?;
        self.store.remove(keys::CHAT_MESSAGES)?;
        info!("Cleared persisted chat session");
        Ok(())
    }
}
