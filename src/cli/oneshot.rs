//! Single-request subcommands: transcribe, summarize and health.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use crate::core::config::data::{path_display, Config};
use crate::core::error::RequestError;
use crate::core::executor::{BackendPayload, BackendRequest, RequestExecutor};
use crate::core::request_manager::RequestManager;
use crate::core::session::Attachment;

/// Runs one backend request under the configured timeout.
pub async fn execute_once(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    request: BackendRequest,
) -> Result<BackendPayload, RequestError> {
    let requests = RequestManager::new();
    let key = request.operation_name();
    requests
        .submit(key, config.request_timeout(), move |token| async move {
            executor.execute(request, token).await
        })
        .await
}

pub(crate) fn unexpected_payload(payload: BackendPayload) -> Box<dyn Error> {
    RequestError::MalformedResponse(format!("unexpected payload: {payload:?}")).into()
}

pub(crate) fn require_model(config: &Config) -> Result<String, Box<dyn Error>> {
    config.default_model.clone().ok_or_else(|| {
        "No model configured. Pass --model <id> or run 'parley set default-model <id>'.".into()
    })
}

pub async fn transcribe(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    path: &Path,
    media_type: Option<String>,
) -> Result<String, Box<dyn Error>> {
    let audio = Attachment::from_path(path, media_type)
        .await
        .map_err(|err| format!("Failed to read {}: {err}", path_display(path)))?;
    if !audio.is_audio() {
        return Err(format!(
            "{} is {}, not audio. Pass --media-type to override.",
            audio.file_name, audio.media_type
        )
        .into());
    }
    match execute_once(config, executor, BackendRequest::Transcribe { audio }).await? {
        BackendPayload::Transcription(text) => Ok(text),
        other => Err(unexpected_payload(other)),
    }
}

pub async fn run_transcribe(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    path: &Path,
    media_type: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let text = transcribe(config, executor, path, media_type).await?;
    println!("{text}");
    Ok(())
}

pub async fn summarize(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    path: &Path,
) -> Result<String, Box<dyn Error>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| format!("Failed to read {}: {err}", path_display(path)))?;
    let request = BackendRequest::Summarize {
        content,
        model_id: require_model(config)?,
    };
    match execute_once(config, executor, request).await? {
        BackendPayload::Summary(summary) => Ok(summary),
        other => Err(unexpected_payload(other)),
    }
}

pub async fn run_summarize(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let summary = summarize(config, executor, path).await?;
    println!("{summary}");
    Ok(())
}

pub async fn run_health(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
) -> Result<(), Box<dyn Error>> {
    match execute_once(config, executor, BackendRequest::Health).await {
        Ok(BackendPayload::Health(health)) => {
            match health.message {
                Some(message) => println!("✅ {} ({message})", health.status),
                None => println!("✅ {}", health.status),
            }
            Ok(())
        }
        Ok(other) => Err(unexpected_payload(other)),
        Err(err) => {
            eprintln!("❌ {} is not reachable: {err}", config.base_url());
            std::process::exit(1);
        }
    }
}
