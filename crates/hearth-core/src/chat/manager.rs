//! ChatManager - central coordinator for conversations
//!
//! Owns the store, the provider facade, the runtime settings and one
//! [`ChatSession`] per open conversation, and tracks which one is active.

use super::export::{chat_to_text, ChatExport};
use super::session::{ChatSession, GenerationRequest, SessionContext};
use super::storage::ChatStore;
use super::types::ChatSummary;
use crate::config::HearthConfig;
use crate::error::{HearthError, Result};
use crate::llm::{ApiManager, StreamOutcome, UnifiedModel};
use crate::notifications::Notification;
use crate::settings::Settings;
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ChatManager {
    ctx: Arc<SessionContext>,

    /// Loaded configuration, the base that settings reset to
    config: HearthConfig,

    settings: RwLock<Settings>,

    /// Open sessions by chat id
    sessions: RwLock<HashMap<String, Arc<ChatSession>>>,

    active: RwLock<Option<String>>,

    notifications: Receiver<Notification>,
}

impl ChatManager {
    /// Open the store configured in `config` (or `~/.hearth`)
    pub fn new(config: HearthConfig) -> Result<Self> {
        let store = match config.storage.data_dir.clone() {
            Some(dir) => ChatStore::open(dir)?,
            None => ChatStore::open_default()?,
        };
        Self::with_store(config, store)
    }

    /// Create with an explicit store (for testing)
    pub fn with_store(config: HearthConfig, store: ChatStore) -> Result<Self> {
        let api = ApiManager::from_config(&config.llm);

        let mut settings = Settings::from_config(&config);
        settings.apply_entries(&store.get_all_settings()?);
        settings.apply_to(&api);

        let (notifier, notifications) = unbounded();
        let ctx = SessionContext {
            api: Arc::new(api),
            store: Arc::new(store),
            notifier,
            title: config.title.clone(),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            config,
            settings: RwLock::new(settings),
            sessions: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            notifications,
        })
    }

    /// Receiver for session notifications; clones share one queue.
    ///
    /// The queue is unbounded so no delta is ever dropped. A consumer must
    /// keep draining it (as the REPL printer does) or it grows by one entry
    /// per streamed fragment.
    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    pub fn api(&self) -> &Arc<ApiManager> {
        &self.ctx.api
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.ctx.store
    }

    pub fn config(&self) -> &HearthConfig {
        &self.config
    }

    // ========== Conversations ==========

    /// Stored conversations, most recent first
    pub fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        Ok(self
            .ctx
            .store
            .get_all_chats()?
            .iter()
            .map(ChatSummary::from)
            .collect())
    }

    /// Start a conversation and make it active; stored on its first send
    pub fn new_chat(&self) -> Arc<ChatSession> {
        let session = Arc::new(ChatSession::new(Arc::clone(&self.ctx)));
        let id = session.id();
        self.sessions.write().insert(id.clone(), Arc::clone(&session));
        *self.active.write() = Some(id);
        session
    }

    /// Load a conversation (or reuse its open session) and make it active
    pub fn open_chat(&self, id: &str) -> Result<Arc<ChatSession>> {
        let session = self.session(id)?;
        *self.active.write() = Some(id.to_string());
        Ok(session)
    }

    pub fn set_active(&self, id: &str) -> Result<()> {
        self.open_chat(id).map(|_| ())
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.read().clone()
    }

    pub fn active_session(&self) -> Option<Arc<ChatSession>> {
        let id = self.active.read().clone()?;
        self.sessions.read().get(&id).cloned()
    }

    /// Active session, starting a new conversation if there is none
    pub fn active_or_new(&self) -> Arc<ChatSession> {
        match self.active_session() {
            Some(session) => session,
            None => self.new_chat(),
        }
    }

    /// Open session for `id` without changing the active conversation
    fn session(&self, id: &str) -> Result<Arc<ChatSession>> {
        if let Some(session) = self.sessions.read().get(id) {
            return Ok(Arc::clone(session));
        }

        let chat = self
            .ctx
            .store
            .get_chat(id)?
            .ok_or_else(|| HearthError::not_found(format!("Chat {}", id)))?;

        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(ChatSession::open(Arc::clone(&self.ctx), chat)));
        Ok(Arc::clone(session))
    }

    /// Delete a conversation; refused while it is generating
    pub fn delete_chat(&self, id: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write();
            if sessions.get(id).is_some_and(|s| s.is_generating()) {
                return Err(HearthError::busy(id));
            }
            if let Some(session) = sessions.remove(id) {
                session.close();
            }
        }
        self.ctx.store.delete_chat(id)?;

        let mut active = self.active.write();
        if active.as_deref() == Some(id) {
            *active = None;
        }
        tracing::info!(chat = %id, "chat deleted");
        Ok(())
    }

    /// Delete every conversation; refused while any is generating
    pub fn clear_chats(&self) -> Result<()> {
        {
            let sessions = self.sessions.read();
            if let Some(busy) = sessions.values().find(|s| s.is_generating()) {
                return Err(HearthError::busy(busy.id()));
            }
        }

        for (_, session) in self.sessions.write().drain() {
            session.close();
        }
        self.ctx.store.clear_chats()?;
        *self.active.write() = None;
        tracing::info!("all chats deleted");
        Ok(())
    }

    pub fn rename_chat(&self, id: &str, title: &str) -> Result<()> {
        self.session(id)?.rename(title)
    }

    // ========== Export / import ==========

    /// One conversation as plain text
    pub fn export_chat(&self, id: &str) -> Result<String> {
        Ok(chat_to_text(&self.session(id)?.snapshot()))
    }

    /// Every stored conversation as a JSON export document
    pub fn export_all(&self) -> Result<String> {
        ChatExport::new(self.ctx.store.get_all_chats()?).to_json()
    }

    /// Store every chat of an export document, replacing chats with the
    /// same id. Returns how many were imported.
    pub fn import_chats(&self, json: &str) -> Result<usize> {
        let export = ChatExport::from_json(json)?;

        let mut sessions = self.sessions.write();
        if let Some(busy) = export
            .chats
            .iter()
            .find(|c| sessions.get(&c.id).is_some_and(|s| s.is_generating()))
        {
            return Err(HearthError::busy(&busy.id));
        }

        for chat in &export.chats {
            self.ctx.store.put_chat(chat)?;
            // Reloaded from the store on next access
            if let Some(session) = sessions.remove(&chat.id) {
                session.close();
            }
        }

        if let Some(active) = self.active.read().clone() {
            if !sessions.contains_key(&active) {
                if let Some(chat) = export.chats.iter().find(|c| c.id == active) {
                    let session = ChatSession::open(Arc::clone(&self.ctx), chat.clone());
                    sessions.insert(active, Arc::new(session));
                }
            }
        }

        tracing::info!(count = export.chats.len(), "chats imported");
        Ok(export.chats.len())
    }

    // ========== Generation ==========

    /// Request built from the current settings
    pub fn request(&self) -> Result<GenerationRequest> {
        let settings = self.settings.read();
        let model = settings
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| HearthError::config("No model selected"))?;

        Ok(GenerationRequest {
            provider: settings.api_provider,
            model,
            options: settings.generation_options(),
        })
    }

    /// Send on the active conversation, creating one when needed
    pub fn send(&self, content: &str) -> Result<StreamOutcome> {
        let request = self.request()?;
        self.active_or_new().send(content, &request)
    }

    pub fn regenerate(&self, index: usize) -> Result<StreamOutcome> {
        let request = self.request()?;
        self.active_session()
            .ok_or_else(|| HearthError::invalid_operation("No active chat"))?
            .regenerate(index, &request)
    }

    pub fn edit_message(&self, index: usize, content: &str) -> Result<Option<StreamOutcome>> {
        let request = self.request()?;
        self.active_session()
            .ok_or_else(|| HearthError::invalid_operation("No active chat"))?
            .edit_message(index, content, &request)
    }

    /// Stop every running generation; returns how many were signalled
    pub fn stop_all(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|session| session.stop())
            .count()
    }

    pub fn is_generating(&self) -> bool {
        self.sessions.read().values().any(|s| s.is_generating())
    }

    // ========== Settings ==========

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Parse, persist and apply one setting
    pub fn update_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut settings = self.settings.write();
        let mut next = settings.clone();
        let stored = next.set(key, value)?;

        self.ctx.store.put_setting(key, stored)?;

        // A model name only makes sense for the provider it came from
        if next.api_provider != settings.api_provider {
            next.model = self
                .config
                .llm
                .default_model(next.api_provider)
                .map(str::to_string);
            let model = next.model.clone().map(Value::from).unwrap_or(Value::Null);
            self.ctx.store.put_setting("model", model)?;
        }

        next.apply_to(&self.ctx.api);
        *settings = next;
        tracing::info!(key = %key, "setting updated");
        Ok(())
    }

    /// Drop stored settings and return to the configured defaults
    pub fn reset_settings(&self) -> Result<()> {
        self.ctx.store.clear_settings()?;
        let settings = Settings::from_config(&self.config);
        settings.apply_to(&self.ctx.api);
        *self.settings.write() = settings;
        tracing::info!("settings reset");
        Ok(())
    }

    // ========== Providers ==========

    /// Models of the current provider
    pub fn refresh_models(&self) -> Result<Vec<UnifiedModel>> {
        Ok(self.ctx.api.get_models(None)?)
    }

    pub fn check_status(&self) -> bool {
        self.ctx.api.check_status(None)
    }
}
