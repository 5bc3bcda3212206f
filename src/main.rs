//! Hearth - terminal chat client for Ollama and DeepSeek
//!
//! Loads configuration, opens the chat store and runs a line-based REPL on
//! stdin. Streamed replies are printed by a background thread as they
//! arrive; Ctrl-C stops the running generation.

mod repl;
mod slash;

use hearth_core::config::{load_config, sample_config};
use hearth_core::{ChatManager, HearthError, Result};
use repl::Repl;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "\
Usage: hearth [options]

Options:
  --provider <name>   Use provider (ollama, deepseek)
  --model <name>      Use model
  --chat <id>         Open a stored chat
  --data-dir <path>   Store chats and settings under <path>
  --sample-config     Print a sample config file and exit
  -v, --verbose       Debug logging
  -h, --help          Show this help

Type /help inside the REPL for commands.";

/// Command-line arguments
#[derive(Debug, Default)]
struct Args {
    provider: Option<String>,
    model: Option<String>,
    chat: Option<String>,
    data_dir: Option<PathBuf>,
    sample_config: bool,
    verbose: bool,
    help: bool,
}

impl Args {
    fn parse() -> Result<Self> {
        Self::parse_from(std::env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| HearthError::config(format!("{} needs a value", flag)))
            };
            match arg.as_str() {
                "--provider" | "-p" => parsed.provider = Some(value(&arg)?),
                "--model" | "-m" => parsed.model = Some(value(&arg)?),
                "--chat" | "-c" => parsed.chat = Some(value(&arg)?),
                "--data-dir" => parsed.data_dir = Some(PathBuf::from(value(&arg)?)),
                "--sample-config" => parsed.sample_config = true,
                "--verbose" | "-v" => parsed.verbose = true,
                "--help" | "-h" => parsed.help = true,
                other => {
                    return Err(HearthError::config(format!("Unknown argument: {}", other)));
                }
            }
        }

        Ok(parsed)
    }
}

/// Log to stderr so it never interleaves with streamed replies on stdout
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hearth=debug,hearth_core=debug"
    } else {
        "hearth=info,hearth_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if args.sample_config {
        print!("{}", sample_config());
        return Ok(());
    }

    init_tracing(args.verbose);

    let cwd = std::env::current_dir()?;
    let mut config = load_config(&cwd)?;
    if let Some(dir) = args.data_dir.clone() {
        config.storage.data_dir = Some(dir);
    }

    let manager = Arc::new(ChatManager::new(config)?);
    tracing::info!(data_dir = %manager.store().data_dir().display(), "store opened");

    if let Some(provider) = &args.provider {
        manager.update_setting("api_provider", provider)?;
    }
    if let Some(model) = &args.model {
        manager.update_setting("model", model)?;
    }
    if let Some(chat) = &args.chat {
        manager.open_chat(chat)?;
    }

    let settings = manager.settings();
    println!(
        "hearth {} - {} / {} (/help for commands)",
        hearth_core::version(),
        settings.api_provider.name(),
        settings.model.as_deref().unwrap_or("no model selected")
    );
    if !manager.check_status() {
        eprintln!(
            "warning: {} is not reachable",
            settings.api_provider.name()
        );
    }

    repl::spawn_printer(manager.notifications().clone())?;

    let repl = Repl::new(Arc::clone(&manager));
    if let Err(e) = repl.install_interrupt_handler() {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
    repl.run()
}
