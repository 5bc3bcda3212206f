//! Chat persistence layer
//!
//! File-backed record store with two tables: one JSON file per chat under
//! `chats/`, and a single `settings.json` map of setting name to value.

use super::types::Chat;
use crate::error::{HearthError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage backend for chats and settings
#[derive(Debug, Clone)]
pub struct ChatStore {
    /// Base directory (~/.hearth by default)
    data_dir: PathBuf,

    chats_dir: PathBuf,

    settings_path: PathBuf,
}

impl ChatStore {
    /// Open (and create) the store under `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let store = Self {
            chats_dir: data_dir.join("chats"),
            settings_path: data_dir.join("settings.json"),
            data_dir,
        };

        fs::create_dir_all(&store.chats_dir).map_err(|e| {
            HearthError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create data directory: {}", e),
            ))
        })?;

        Ok(store)
    }

    /// Open the store in `~/.hearth`
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::home_dir()
            .ok_or_else(|| HearthError::config("Could not determine home directory"))?
            .join(".hearth");
        Self::open(data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn chat_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HearthError::invalid_operation(format!("Invalid chat id: {}", id)));
        }
        Ok(self.chats_dir.join(format!("{}.json", id)))
    }

    // ========== Chats ==========

    /// All chats, most recently updated first.
    ///
    /// Records that cannot be read are logged and skipped.
    pub fn get_all_chats(&self) -> Result<Vec<Chat>> {
        let mut chats = Vec::new();

        for entry in fs::read_dir(&self.chats_dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            match read_chat(&path) {
                Ok(chat) => chats.push(chat),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable chat");
                }
            }
        }

        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let path = self.chat_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_chat(&path).map(Some)
    }

    /// Insert or replace a chat record
    pub fn put_chat(&self, chat: &Chat) -> Result<()> {
        let path = self.chat_path(&chat.id)?;
        let content = serde_json::to_string_pretty(chat)?;
        write_atomic(&path, &content)?;
        tracing::debug!(chat = %chat.id, messages = chat.messages.len(), "chat saved");
        Ok(())
    }

    /// Remove a chat; missing records are not an error
    pub fn delete_chat(&self, id: &str) -> Result<()> {
        let path = self.chat_path(id)?;
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::debug!(chat = %id, "chat deleted");
        }
        Ok(())
    }

    pub fn clear_chats(&self) -> Result<()> {
        for entry in fs::read_dir(&self.chats_dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        tracing::debug!("all chats cleared");
        Ok(())
    }

    // ========== Settings ==========

    pub fn get_all_settings(&self) -> Result<Map<String, Value>> {
        if !self.settings_path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.settings_path)?;
        serde_json::from_str(&content)
            .map_err(|e| HearthError::Serialization(format!("Failed to parse settings: {}", e)))
    }

    /// Insert or replace one setting
    pub fn put_setting(&self, name: &str, value: Value) -> Result<()> {
        let mut settings = self.get_all_settings()?;
        settings.insert(name.to_string(), value);
        self.save_settings(&settings)
    }

    pub fn delete_setting(&self, name: &str) -> Result<()> {
        let mut settings = self.get_all_settings()?;
        if settings.remove(name).is_some() {
            self.save_settings(&settings)?;
        }
        Ok(())
    }

    pub fn clear_settings(&self) -> Result<()> {
        if self.settings_path.exists() {
            fs::remove_file(&self.settings_path)?;
        }
        Ok(())
    }

    fn save_settings(&self, settings: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)?;
        write_atomic(&self.settings_path, &content)
    }
}

fn read_chat(path: &Path) -> Result<Chat> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| HearthError::Serialization(format!("Failed to parse chat: {}", e)))
}

/// Write via a temp file and rename
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(|e| {
        HearthError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", temp_path.display(), e),
        ))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        HearthError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to save {}: {}", path.display(), e),
        ))
    })?;

    Ok(())
}
