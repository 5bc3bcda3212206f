//! Chat session controller
//!
//! One [`ChatSession`] per open conversation. A session is either idle or
//! running exactly one generation episode; a second send while an episode
//! is running is refused with [`HearthError::Busy`].
//!
//! Every episode ends in one of two ways:
//! - success or cancellation: the assistant message is finalized with
//!   whatever content arrived, `done` forced true, and the chat persisted
//! - error: the conversation is restored to its state before the
//!   operation started and a failure notification is sent

use super::storage::ChatStore;
use super::title::{clean_title, fallback_title, title_options, title_prompt};
use super::types::{Chat, Message, DEFAULT_CHAT_TITLE};
use crate::config::TitleConfig;
use crate::error::{HearthError, Result};
use crate::llm::{
    ApiManager, CancelToken, ChatMessage, GenerationOptions, ProviderKind, Role, StreamOutcome,
    UnifiedStreamChunk,
};
use crate::notifications::Notification;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Provider, model and options for one episode, fixed when it starts
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub provider: ProviderKind,
    pub model: String,
    pub options: GenerationOptions,
}

/// Collaborators shared by every session of a manager
pub struct SessionContext {
    pub api: Arc<ApiManager>,
    pub store: Arc<ChatStore>,
    pub notifier: Sender<Notification>,
    pub title: TitleConfig,
}

impl SessionContext {
    fn notify(&self, notification: Notification) {
        // A UI that went away is not an error for the session
        let _ = self.notifier.send(notification);
    }

    fn persist(&self, chat: &Chat) -> Result<()> {
        self.store.put_chat(chat)?;
        self.notify(Notification::ChatSaved {
            chat_id: chat.id.clone(),
        });
        Ok(())
    }
}

/// Clears the in-flight slot when the episode ends, however it ends
struct Episode<'a> {
    slot: &'a Mutex<Option<CancelToken>>,
    token: CancelToken,
}

impl Drop for Episode<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

pub struct ChatSession {
    chat: Arc<RwLock<Chat>>,

    /// Cancel token of the running episode, if any
    in_flight: Mutex<Option<CancelToken>>,

    /// Whether the chat has a record in the store
    saved: AtomicBool,

    /// Set once the chat is deleted; late title replies are dropped
    closed: Arc<AtomicBool>,

    /// Serializes store writes of this chat
    persist_lock: Arc<Mutex<()>>,

    ctx: Arc<SessionContext>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("chat_id", &self.chat.read().id)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Session for a brand-new, not yet stored conversation
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self::build(ctx, Chat::new(), false)
    }

    /// Session for a conversation loaded from the store
    pub fn open(ctx: Arc<SessionContext>, chat: Chat) -> Self {
        Self::build(ctx, chat, true)
    }

    fn build(ctx: Arc<SessionContext>, chat: Chat, saved: bool) -> Self {
        Self {
            chat: Arc::new(RwLock::new(chat)),
            in_flight: Mutex::new(None),
            saved: AtomicBool::new(saved),
            closed: Arc::new(AtomicBool::new(false)),
            persist_lock: Arc::new(Mutex::new(())),
            ctx,
        }
    }

    pub fn id(&self) -> String {
        self.chat.read().id.clone()
    }

    pub fn title(&self) -> String {
        self.chat.read().title.clone()
    }

    /// Copy of the conversation as it is right now
    pub fn snapshot(&self) -> Chat {
        self.chat.read().clone()
    }

    /// True until the first successful write to the store
    pub fn is_new(&self) -> bool {
        !self.saved.load(Ordering::SeqCst)
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Cancel the running episode; false when idle
    pub fn stop(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                tracing::info!(chat = %self.id(), "stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop any episode and drop late background results
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop();
    }

    fn begin(&self) -> Result<Episode<'_>> {
        let mut slot = self.in_flight.lock();
        if slot.is_some() {
            return Err(HearthError::busy(self.id()));
        }
        let token = CancelToken::new();
        *slot = Some(token.clone());
        Ok(Episode {
            slot: &self.in_flight,
            token,
        })
    }

    fn save(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();
        let chat = self.snapshot();
        self.ctx.persist(&chat)?;
        self.saved.store(true, Ordering::SeqCst);
        Ok(())
    }

    // ========== Operations ==========

    /// Append a user message and stream the assistant reply into a new
    /// placeholder. Blocks until the episode ends.
    pub fn send(&self, content: &str, request: &GenerationRequest) -> Result<StreamOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(HearthError::invalid_operation("Message is empty"));
        }

        let episode = self.begin()?;
        let before = self.snapshot();
        let title_seed = (before.messages.is_empty() && before.title == DEFAULT_CHAT_TITLE)
            .then(|| content.to_string());

        {
            let mut chat = self.chat.write();
            chat.messages.push(Message::user(content));
            chat.messages.push(Message::placeholder());
            chat.touch();
        }

        self.generate(&episode, before, request, title_seed)
    }

    /// Drop the assistant message at `index` and everything after it, then
    /// generate a new reply to the user message before it.
    pub fn regenerate(&self, index: usize, request: &GenerationRequest) -> Result<StreamOutcome> {
        let episode = self.begin()?;
        let before = self.snapshot();

        match before.messages.get(index) {
            Some(m) if m.role == Role::Assistant => {}
            Some(_) => {
                return Err(HearthError::invalid_operation(format!(
                    "Message {} is not an assistant reply",
                    index
                )))
            }
            None => return Err(HearthError::not_found(format!("Message {}", index))),
        }
        let preceded_by_user = index
            .checked_sub(1)
            .and_then(|i| before.messages.get(i))
            .is_some_and(Message::is_user);
        if !preceded_by_user {
            return Err(HearthError::invalid_operation(format!(
                "Message {} does not follow a user message",
                index
            )));
        }

        {
            let mut chat = self.chat.write();
            chat.messages.truncate(index);
            chat.messages.push(Message::placeholder());
            chat.touch();
        }

        self.generate(&episode, before, request, None)
    }

    /// Change the message at `index`.
    ///
    /// A user message is rewritten, everything after it dropped and a new
    /// reply generated. An assistant message is rewritten in place and saved
    /// with no generation, in which case `None` is returned.
    pub fn edit_message(
        &self,
        index: usize,
        content: &str,
        request: &GenerationRequest,
    ) -> Result<Option<StreamOutcome>> {
        let episode = self.begin()?;
        let before = self.snapshot();

        let role = before
            .messages
            .get(index)
            .map(|m| m.role)
            .ok_or_else(|| HearthError::not_found(format!("Message {}", index)))?;

        match role {
            Role::Assistant => {
                {
                    let mut chat = self.chat.write();
                    let message = &mut chat.messages[index];
                    message.content = content.to_string();
                    message.done = true;
                    chat.touch();
                }
                drop(episode);
                self.save()?;
                Ok(None)
            }
            Role::User => {
                let content = content.trim();
                if content.is_empty() {
                    return Err(HearthError::invalid_operation("Message is empty"));
                }
                {
                    let mut chat = self.chat.write();
                    chat.messages.truncate(index + 1);
                    chat.messages[index].content = content.to_string();
                    chat.messages.push(Message::placeholder());
                    chat.touch();
                }
                self.generate(&episode, before, request, None).map(Some)
            }
            Role::System => Err(HearthError::invalid_operation(
                "System messages cannot be edited",
            )),
        }
    }

    /// Set the title and persist
    pub fn rename(&self, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(HearthError::invalid_operation("Title is empty"));
        }

        // Holding the slot keeps an episode from starting mid-save
        let slot = self.in_flight.lock();
        if slot.is_some() {
            drop(slot);
            apply_title(&self.ctx, &self.chat, &self.persist_lock, title.to_string());
            return Ok(());
        }

        self.chat.write().title = title.to_string();
        self.save()?;
        drop(slot);
        self.ctx.notify(Notification::TitleUpdated {
            chat_id: self.id(),
            title: title.to_string(),
        });
        Ok(())
    }

    // ========== Episode ==========

    /// Stream into the trailing placeholder. `before` is the state restored
    /// on failure.
    fn generate(
        &self,
        episode: &Episode<'_>,
        before: Chat,
        request: &GenerationRequest,
        title_seed: Option<String>,
    ) -> Result<StreamOutcome> {
        let (chat_id, message_id, history) = {
            let chat = self.chat.read();
            let message_id = chat
                .messages
                .last()
                .map(|m| m.id.clone())
                .unwrap_or_default();
            (chat.id.clone(), message_id, chat.history())
        };

        tracing::debug!(
            chat = %chat_id,
            provider = %request.provider,
            model = %request.model,
            turns = history.len(),
            "generation started"
        );
        self.ctx.notify(Notification::GenerationStarted {
            chat_id: chat_id.clone(),
            message_id: message_id.clone(),
        });

        let mut usage = None;
        let result = self
            .ctx
            .api
            .open_stream(
                &history,
                &request.model,
                &request.options,
                episode.token.clone(),
                Some(request.provider),
            )
            .and_then(|stream| {
                stream.drive(|chunk| {
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    self.apply_chunk(&chat_id, &message_id, chunk);
                })
            });

        match result {
            Ok(outcome) => {
                self.finalize(&message_id);
                if outcome == StreamOutcome::Cancelled {
                    tracing::info!(chat = %chat_id, "generation cancelled, partial reply kept");
                }

                let title_seed = title_seed.filter(|_| outcome == StreamOutcome::Completed);
                if let Some(first_message) = &title_seed {
                    if !self.ctx.title.enabled {
                        self.chat.write().title =
                            fallback_title(first_message, self.ctx.title.max_chars);
                    }
                }

                let saved = self.save();
                if let Some(first_message) = title_seed.filter(|_| self.ctx.title.enabled) {
                    self.start_title(first_message, request);
                }
                self.ctx.notify(Notification::GenerationFinished {
                    chat_id,
                    message_id,
                    outcome,
                    usage,
                });
                saved.map(|_| outcome)
            }
            Err(e) => {
                tracing::warn!(chat = %chat_id, error = %e, "generation failed, rolling back");
                {
                    // A title that landed mid-episode survives the rollback
                    let mut chat = self.chat.write();
                    chat.messages = before.messages;
                    chat.updated_at = before.updated_at;
                }
                self.ctx.notify(Notification::GenerationFailed {
                    chat_id,
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn apply_chunk(&self, chat_id: &str, message_id: &str, chunk: UnifiedStreamChunk) {
        {
            let mut chat = self.chat.write();
            if let Some(message) = chat.messages.iter_mut().rev().find(|m| m.id == message_id) {
                message.content.push_str(&chunk.content);
                message.done = chunk.done;
            }
        }

        if !chunk.content.is_empty() {
            self.ctx.notify(Notification::AssistantDelta {
                chat_id: chat_id.to_string(),
                message_id: message_id.to_string(),
                delta: chunk.content,
            });
        }
    }

    fn finalize(&self, message_id: &str) {
        let mut chat = self.chat.write();
        if let Some(message) = chat.messages.iter_mut().rev().find(|m| m.id == message_id) {
            message.done = true;
        }
        chat.touch();
    }

    // ========== Titles ==========

    /// Title the conversation after its first exchange without blocking it
    fn start_title(&self, first_message: String, request: &GenerationRequest) {
        let chat = Arc::clone(&self.chat);
        let closed = Arc::clone(&self.closed);
        let persist_lock = Arc::clone(&self.persist_lock);
        let ctx = Arc::clone(&self.ctx);
        let request = request.clone();
        let fallback = fallback_title(&first_message, ctx.title.max_chars);

        let spawned = std::thread::Builder::new()
            .name("hearth-title".into())
            .spawn(move || {
                let title = request_title(&ctx, &first_message, &request);
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                apply_title(&ctx, &chat, &persist_lock, title);
            });

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start title thread");
            apply_title(&self.ctx, &self.chat, &self.persist_lock, fallback);
        }
    }
}

/// Set the title in memory and on the stored record.
///
/// Only the stored record's title is patched: the live chat may be in the
/// middle of another episode whose messages must not reach the store.
fn apply_title(ctx: &SessionContext, chat: &RwLock<Chat>, persist_lock: &Mutex<()>, title: String) {
    let _guard = persist_lock.lock();
    let chat_id = {
        let mut chat = chat.write();
        chat.title = title.clone();
        chat.id.clone()
    };

    match ctx.store.get_chat(&chat_id) {
        Ok(Some(mut stored)) => {
            stored.title = title.clone();
            if let Err(e) = ctx.persist(&stored) {
                tracing::warn!(chat = %chat_id, error = %e, "failed to save title");
            }
        }
        Ok(None) => tracing::debug!(chat = %chat_id, "chat not stored yet, title kept in memory"),
        Err(e) => tracing::warn!(chat = %chat_id, error = %e, "failed to load chat for title"),
    }

    ctx.notify(Notification::TitleUpdated { chat_id, title });
}

/// Ask the provider for a title, falling back to truncation on any failure
fn request_title(ctx: &SessionContext, first_message: &str, request: &GenerationRequest) -> String {
    let max_chars = ctx.title.max_chars;
    let prompt = [ChatMessage::user(title_prompt(first_message, max_chars))];

    match ctx
        .api
        .chat(&prompt, &request.model, &title_options(), Some(request.provider))
    {
        Ok(reply) => clean_title(&reply).unwrap_or_else(|| fallback_title(first_message, max_chars)),
        Err(e) => {
            tracing::warn!(error = %e, "title generation failed, using fallback");
            fallback_title(first_message, max_chars)
        }
    }
}
