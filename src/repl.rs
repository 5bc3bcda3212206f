//! Line-based front end over [`ChatManager`]

use crate::slash::{self, ExportScope, SlashCommand, COMMANDS};
use crossbeam_channel::Receiver;
use hearth_core::chat::ChatSummary;
use hearth_core::llm::{CancelToken, ProviderKind, Role, StreamOutcome, TokenUsage};
use hearth_core::{ChatManager, HearthError, Notification, Result};
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// What the loop does after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl {
    manager: Arc<ChatManager>,

    /// Cancel token of a running `/pull`
    pull: Arc<Mutex<Option<CancelToken>>>,
}

impl Repl {
    pub fn new(manager: Arc<ChatManager>) -> Self {
        Self {
            manager,
            pull: Arc::new(Mutex::new(None)),
        }
    }

    /// Ctrl-C stops running work; with nothing running it exits.
    pub fn install_interrupt_handler(&self) -> std::result::Result<(), ctrlc::Error> {
        let manager = Arc::clone(&self.manager);
        let pull = Arc::clone(&self.pull);
        ctrlc::set_handler(move || {
            let mut stopped = manager.stop_all();
            if let Some(token) = pull.lock().as_ref() {
                token.cancel();
                stopped += 1;
            }
            if stopped == 0 {
                println!();
                std::process::exit(130);
            }
            tracing::debug!(stopped, "interrupted");
        })
    }

    /// Read stdin until EOF or `/quit`
    pub fn run(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            prompt()?;
            let Some(line) = lines.next() else {
                println!();
                return Ok(());
            };
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match self.handle_line(&line) {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => eprintln!("error: {}", e),
            }
        }
    }

    pub fn handle_line(&self, line: &str) -> Result<Flow> {
        match slash::parse(line) {
            None => {
                reported(self.manager.send(line))?;
                Ok(Flow::Continue)
            }
            Some(Ok(command)) => self.execute(command),
            Some(Err(e)) => {
                eprintln!("{} (try /help)", e);
                Ok(Flow::Continue)
            }
        }
    }

    fn execute(&self, command: SlashCommand) -> Result<Flow> {
        let manager = &self.manager;
        match command {
            SlashCommand::Help => {
                for help in COMMANDS {
                    println!("  {:<20} {}", help.usage, help.description);
                }
            }
            SlashCommand::New => {
                let session = manager.new_chat();
                println!("new chat {}", short_id(&session.id()));
            }
            SlashCommand::List => {
                let chats = manager.list_chats()?;
                if chats.is_empty() {
                    println!("no chats yet");
                }
                let active = manager.active_id();
                for chat in &chats {
                    print_summary(chat, active.as_deref() == Some(chat.id.as_str()));
                }
            }
            SlashCommand::Open { id } => {
                let id = self.resolve_chat(&id)?;
                let session = manager.open_chat(&id)?;
                println!("opened \"{}\"", session.title());
                self.print_history();
            }
            SlashCommand::Delete { id } => {
                let id = self.resolve_chat(&id)?;
                manager.delete_chat(&id)?;
                println!("deleted {}", short_id(&id));
            }
            SlashCommand::ClearAll => {
                manager.clear_chats()?;
                println!("all chats deleted");
            }
            SlashCommand::Title { title } => {
                let id = manager
                    .active_id()
                    .ok_or_else(|| HearthError::invalid_operation("No active chat"))?;
                manager.rename_chat(&id, &title)?;
            }
            SlashCommand::Regenerate { index } => {
                let index = match index {
                    Some(index) => index,
                    None => self.last_reply()?,
                };
                reported(manager.regenerate(index))?;
            }
            SlashCommand::Edit { index, text } => {
                if let Some(None) = reported(manager.edit_message(index, &text))? {
                    println!("message {} updated", index + 1);
                }
            }
            SlashCommand::Models => {
                let settings = manager.settings();
                for model in manager.refresh_models()? {
                    let marker = if settings.model.as_deref() == Some(model.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    match model.size {
                        Some(size) => println!("{} {} ({})", marker, model.name, format_size(size)),
                        None => println!("{} {}", marker, model.name),
                    }
                }
            }
            SlashCommand::Model { name } => {
                manager.update_setting("model", &name)?;
                println!("model: {}", name);
            }
            SlashCommand::Provider { name } => {
                manager.update_setting("api_provider", &name)?;
                let settings = manager.settings();
                println!(
                    "provider: {} (model: {})",
                    settings.api_provider.name(),
                    settings.model.as_deref().unwrap_or("none")
                );
            }
            SlashCommand::Status => {
                let api = manager.api();
                for provider in ProviderKind::ALL {
                    let reachable = api.check_status(Some(provider));
                    let configured = api.validate_config(provider);
                    println!(
                        "{:<9} {}{}",
                        provider.name(),
                        if reachable { "online" } else { "offline" },
                        if configured { "" } else { " (not configured)" }
                    );
                }
            }
            SlashCommand::Set { key, value } => {
                manager.update_setting(&key, &value)?;
                println!("{} updated", key);
            }
            SlashCommand::Settings => {
                let settings = manager.settings();
                for (key, value) in settings.entries() {
                    if key == "deepseek_api_key" {
                        println!("  {:<18} {}", key, settings.masked_api_key());
                    } else {
                        println!("  {:<18} {}", key, value);
                    }
                }
            }
            SlashCommand::ResetSettings => {
                manager.reset_settings()?;
                println!("settings reset");
            }
            SlashCommand::Pull { name } => self.pull(&name)?,
            SlashCommand::Remove { name } => {
                manager.api().delete_model(&name)?;
                println!("deleted model {}", name);
            }
            SlashCommand::History => self.print_history(),
            SlashCommand::Export { scope, path } => {
                let content = match scope {
                    ExportScope::All => manager.export_all()?,
                    ExportScope::Active => {
                        let id = manager
                            .active_id()
                            .ok_or_else(|| HearthError::invalid_operation("No active chat"))?;
                        manager.export_chat(&id)?
                    }
                };
                std::fs::write(&path, content)?;
                println!("exported to {}", path.display());
            }
            SlashCommand::Import { path } => {
                let json = std::fs::read_to_string(&path)?;
                let count = manager.import_chats(&json)?;
                println!("imported {} chats", count);
            }
            SlashCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Full id from a unique id prefix
    fn resolve_chat(&self, prefix: &str) -> Result<String> {
        let chats = self.manager.list_chats()?;
        let mut matches = chats.iter().filter(|c| c.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(chat), None) => Ok(chat.id.clone()),
            (None, _) => Err(HearthError::not_found(format!("Chat {}", prefix))),
            (Some(_), Some(_)) => Err(HearthError::invalid_operation(format!(
                "'{}' matches more than one chat",
                prefix
            ))),
        }
    }

    fn last_reply(&self) -> Result<usize> {
        self.manager
            .active_session()
            .and_then(|s| s.snapshot().messages.iter().rposition(|m| m.is_assistant()))
            .ok_or_else(|| HearthError::invalid_operation("Nothing to regenerate"))
    }

    fn print_history(&self) {
        let Some(session) = self.manager.active_session() else {
            println!("no active chat");
            return;
        };
        for (n, message) in session.snapshot().messages.iter().enumerate() {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            println!("[{}] {}> {}", n + 1, who, message.content);
        }
    }

    fn pull(&self, name: &str) -> Result<()> {
        let token = CancelToken::new();
        *self.pull.lock() = Some(token.clone());

        let mut last_status = String::new();
        let result = self.manager.api().pull_model(
            name,
            |progress| {
                match progress.fraction() {
                    Some(fraction) => {
                        print!("\r{} {:>5.1}%", progress.status, fraction * 100.0);
                    }
                    None if progress.status != last_status => {
                        print!("\n{}", progress.status);
                    }
                    None => {}
                }
                last_status = progress.status;
                let _ = io::stdout().flush();
            },
            token,
        );
        *self.pull.lock() = None;
        println!();

        match result? {
            StreamOutcome::Completed => println!("pulled {}", name),
            StreamOutcome::Cancelled => println!("pull cancelled"),
        }
        Ok(())
    }
}

/// Provider errors during generation were already printed from their
/// failure notification
fn reported<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(HearthError::Llm(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Print notifications until the manager goes away
pub fn spawn_printer(notifications: Receiver<Notification>) -> io::Result<()> {
    std::thread::Builder::new()
        .name("hearth-printer".into())
        .spawn(move || {
            for notification in notifications {
                render(&notification);
            }
        })
        .map(|_| ())
}

fn render(notification: &Notification) {
    let mut out = io::stdout().lock();
    let _ = match notification {
        Notification::GenerationStarted { .. } => write!(out, "assistant> "),
        Notification::AssistantDelta { delta, .. } => write!(out, "{}", delta),
        Notification::GenerationFinished { outcome, usage, .. } => {
            match (outcome, usage) {
                (StreamOutcome::Cancelled, _) => writeln!(out, " [stopped]"),
                (StreamOutcome::Completed, Some(usage)) => {
                    writeln!(out, "\n{}", format_usage(usage))
                }
                (StreamOutcome::Completed, None) => writeln!(out),
            }
        }
        Notification::GenerationFailed { message, .. } => writeln!(out, "\nerror: {}", message),
        Notification::TitleUpdated { title, .. } => writeln!(out, "[title: {}]", title),
        Notification::ChatSaved { .. } => Ok(()),
    };
    let _ = out.flush();
}

fn prompt() -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "> ")?;
    out.flush()
}

fn print_summary(chat: &ChatSummary, active: bool) {
    println!(
        "{} {}  {:<30} {} messages",
        if active { "*" } else { " " },
        short_id(&chat.id),
        chat.title,
        chat.message_count
    );
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_usage(usage: &TokenUsage) -> String {
    let count = |n: Option<u32>| n.map_or_else(|| "?".to_string(), |n| n.to_string());
    format!(
        "[tokens: {} prompt, {} completion]",
        count(usage.prompt_tokens),
        count(usage.completion_tokens)
    )
}

fn format_size(bytes: u64) -> String {
    const GB: u64 = 1 << 30;
    const MB: u64 = 1 << 20;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else {
        format!("{} MB", bytes / MB)
    }
}
