//! Non-interactive "say" command

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::ChatRequest;
use crate::cli::oneshot::{execute_once, require_model, unexpected_payload};
use crate::core::config::Config;
use crate::core::executor::{BackendPayload, BackendRequest, RequestExecutor};
use crate::core::presenter::{CadenceScheduler, CancelPolicy, StreamPresenter};
use crate::ui::markdown::renderer_for;

pub async fn run_say(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: parley say <prompt>");
        std::process::exit(1);
    }

    let mut stdout = io::stdout();
    say(config, executor, &prompt, &mut stdout).await?;
    Ok(())
}

/// Sends `prompt` without history and reveals the reply into `out`.
pub async fn say<W: Write + Send>(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    prompt: &str,
    out: &mut W,
) -> Result<String, Box<dyn Error>> {
    let request = BackendRequest::Chat(ChatRequest {
        model_id: require_model(config)?,
        message: prompt.trim().to_string(),
        conversation_id: None,
        history: Vec::new(),
    });
    let reply = match execute_once(config, executor, request).await? {
        BackendPayload::Reply(reply) => reply,
        other => return Err(unexpected_payload(other)),
    };

    let presenter = StreamPresenter::new(
        Arc::new(CadenceScheduler::new(config.reveal_cadence())),
        renderer_for(config.markdown_enabled()),
    );
    let mut write_error: Option<io::Error> = None;
    let completion = presenter
        .present(
            &reply,
            CancelPolicy::FinalizeFull,
            &CancellationToken::new(),
            |update| {
                if write_error.is_some() {
                    return;
                }
                if let Err(err) = out
                    .write_all(update.unit.as_bytes())
                    .and_then(|_| out.flush())
                {
                    write_error = Some(err);
                }
            },
        )
        .await;
    if let Some(err) = write_error {
        return Err(err.into());
    }
    writeln!(out)?;

    Ok(completion.content)
}
