//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod model_list;
pub mod oneshot;
pub mod say;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::cli::chat::run_chat;
use crate::cli::model_list::list_models;
use crate::cli::oneshot::{run_health, run_summarize, run_transcribe};
use crate::cli::say::run_say;
use crate::core::config::Config;
use crate::core::executor::{HttpExecutor, RequestExecutor};
use crate::utils::logging::init_tracing;
use crate::utils::url::validate_base_url;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")"
);

#[derive(Parser)]
#[command(name = "parley")]
#[command(version = VERSION)]
#[command(about = "A terminal chat client for a multi-model chat backend")]
#[command(
    long_about = "Parley talks to a chat backend that fronts several language models. \
Replies are revealed progressively; files can be attached for analysis, and audio \
attachments are transcribed.\n\n\
Configuration:\n\
  Use 'parley set <key> <value>' to change defaults such as base-url or default-model.\n\
  Command-line flags override the configuration file for one run.\n\n\
Commands inside the chat:\n\
  /help             List every slash command\n\
  /attach <path>    Stage a file for the next message\n\
  /retry [id]       Resend a failed message\n\
  /cancel           Cancel the pending request"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model to use for this run
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Request timeout in milliseconds
    #[arg(short = 't', long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Write diagnostics to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "PATH")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// List the models offered by the backend
    Models {
        /// Only show models in this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Send a single prompt and print the reply
    Say {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Transcribe an audio file
    Transcribe {
        path: PathBuf,
        /// Override the media type guessed from the file extension
        #[arg(long)]
        media_type: Option<String>,
    },
    /// Summarize the contents of a text file
    Summarize { path: PathBuf },
    /// Check that the backend is reachable
    Health,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        value: Option<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

impl Args {
    /// Folds command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<(), Box<dyn Error>> {
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(validate_base_url(base_url)?);
        }
        if let Some(model) = &self.model {
            config.default_model = Some(model.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout_ms = Some(timeout_ms);
        }
        Ok(())
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();
    init_tracing(args.log.as_deref())?;

    let mut config = Config::load()?;
    let command = args.command.take().unwrap_or(Commands::Chat);

    match command {
        Commands::Set { key, value } => {
            match (key, value) {
                (Some(key), Some(value)) => {
                    config.set_value(&key, &value)?;
                    config.save()?;
                    println!("✅ Set {key} to: {value}");
                }
                _ => config.print_all(),
            }
            Ok(())
        }
        Commands::Unset { key } => {
            config.unset_value(&key)?;
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
        command => {
            args.apply_overrides(&mut config)?;
            let executor: Arc<dyn RequestExecutor> = Arc::new(HttpExecutor::new(
                reqwest::Client::new(),
                config.base_url(),
            ));
            run_backend_command(command, config, executor).await
        }
    }
}

async fn run_backend_command(
    command: Commands,
    config: Config,
    executor: Arc<dyn RequestExecutor>,
) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Chat => run_chat(config, executor).await,
        Commands::Models { category } => list_models(&config, executor, category).await,
        Commands::Say { prompt } => run_say(&config, executor, prompt).await,
        Commands::Transcribe { path, media_type } => {
            run_transcribe(&config, executor, &path, media_type).await
        }
        Commands::Summarize { path } => run_summarize(&config, executor, &path).await,
        Commands::Health => run_health(&config, executor).await,
        Commands::Set { .. } | Commands::Unset { .. } => Ok(()),
    }
}
