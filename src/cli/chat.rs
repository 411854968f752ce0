//! Interactive chat loop
//!
//! Reads lines from stdin, turns them into orchestrator actions and prints
//! the events the orchestrator emits. The orchestrator itself runs on its own
//! task behind a [`ChatRuntime`].

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::model_list::{fetch_models, print_models};
use crate::commands::{process_input, CommandContext, CommandResult};
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::executor::RequestExecutor;
use crate::core::orchestrator::runtime::ChatRuntime;
use crate::core::orchestrator::{
    ChatAction, ChatActionDispatcher, ChatEventSink, ChatOrchestrator, OrchestratorSettings,
};
use crate::core::persistence::{load_session, FileStore, KeyValueStore, MemoryStore};
use crate::core::presenter::CadenceScheduler;
use crate::core::session::{Attachment, ChatSession};
use crate::ui::markdown::renderer_for;
use crate::ui::terminal::TerminalView;

pub async fn run_chat(
    config: Config,
    executor: Arc<dyn RequestExecutor>,
) -> Result<(), Box<dyn Error>> {
    let store = open_store(&config);
    let session = match &store {
        Some(store) => load_session(store.as_ref()),
        None => ChatSession::new(),
    };

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut orchestrator = ChatOrchestrator::new(
        session,
        OrchestratorSettings::from_config(&config),
        renderer_for(config.markdown_enabled()),
    )
    .with_events(ChatEventSink::new(event_tx));
    if let Some(store) = store {
        orchestrator = orchestrator.with_store(store);
    }

    let mut view = TerminalView::new(io::stdout());
    print_banner(&config, orchestrator.session())?;
    view.print_transcript(orchestrator.session().messages())?;

    let (runtime, dispatcher) = ChatRuntime::new(
        orchestrator,
        Arc::clone(&executor),
        Arc::new(CadenceScheduler::new(config.reveal_cadence())),
    );
    let runtime_task = tokio::spawn(runtime.run());

    let repl = Repl {
        config: &config,
        executor,
        dispatcher: dispatcher.clone(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => view.handle(&event)?,
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let context = CommandContext {
                    last_retryable: view.last_retryable(),
                };
                let mut stdout = io::stdout();
                if !repl.handle_line(&context, &line, &mut stdout).await? {
                    break;
                }
            }
        }
    }

    dispatcher.dispatch(ChatAction::Shutdown);
    if let Err(err) = runtime_task.await {
        warn!(error = %err, "chat runtime did not shut down cleanly");
    }
    while let Ok(event) = events.try_recv() {
        view.handle(&event)?;
    }
    Ok(())
}

fn open_store(config: &Config) -> Option<Arc<dyn KeyValueStore>> {
    if !config.persist_enabled() {
        return None;
    }
    match FileStore::open_default() {
        Ok(store) => {
            debug!(path = %path_display(store.path()), "opened transcript store");
            Some(Arc::new(store))
        }
        Err(err) => {
            warn!(error = %err, "transcript store unavailable; history will not survive exit");
            Some(Arc::new(MemoryStore::new()))
        }
    }
}

fn print_banner(config: &Config, session: &ChatSession) -> io::Result<()> {
    let mut out = io::stdout();
    writeln!(out, "💬 parley connected to {}", config.base_url())?;
    match session.selected_model.as_ref().or(config.default_model.as_ref()) {
        Some(model) => writeln!(out, "   Model: {model}")?,
        None => writeln!(out, "   No model selected. Use /models and /model <id>.")?,
    }
    writeln!(out, "   Type /help for commands, /quit to leave.")?;
    writeln!(out)?;
    out.flush()
}

/// Input side of the chat loop.
struct Repl<'a> {
    config: &'a Config,
    executor: Arc<dyn RequestExecutor>,
    dispatcher: ChatActionDispatcher,
}

impl Repl<'_> {
    /// Handles one input line. Returns `false` when the user asked to quit.
    async fn handle_line<W: Write>(
        &self,
        context: &CommandContext,
        line: &str,
        out: &mut W,
    ) -> Result<bool, Box<dyn Error>> {
        match process_input(context, line) {
            CommandResult::ProcessAsMessage(text) => {
                self.dispatcher.dispatch(ChatAction::Send { text });
            }
            CommandResult::Dispatch(action) => self.dispatcher.dispatch(action),
            CommandResult::AttachFile { path, media_type } => {
                match Attachment::from_path(&path, media_type).await {
                    Ok(attachment) => self.dispatcher.dispatch(ChatAction::Attach(attachment)),
                    Err(err) => {
                        writeln!(out, "❌ Cannot attach {}: {err}", path_display(&path))?
                    }
                }
            }
            CommandResult::ListModels { category } => {
                match fetch_models(self.config, Arc::clone(&self.executor)).await {
                    Ok(models) => print_models(
                        out,
                        &models,
                        category.as_deref(),
                        self.config.default_model.as_deref(),
                    )?,
                    Err(err) => writeln!(out, "❌ Failed to list models: {err}")?,
                }
            }
            CommandResult::Status(text) => writeln!(out, "{text}")?,
            CommandResult::Quit => return Ok(false),
        }
        out.flush()?;
        Ok(true)
    }
}
