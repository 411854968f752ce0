//! Model listing functionality
//!
//! Fetches the backend's model catalogue and prints it grouped by category.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use crate::api::models::{filter_by_category, sort_models, ModelConfig};
use crate::cli::oneshot::{execute_once, unexpected_payload};
use crate::core::config::Config;
use crate::core::executor::{BackendPayload, BackendRequest, RequestExecutor};

pub async fn fetch_models(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
) -> Result<Vec<ModelConfig>, Box<dyn Error>> {
    match execute_once(config, executor, BackendRequest::ListModels).await? {
        BackendPayload::Models(mut models) => {
            sort_models(&mut models);
            Ok(models)
        }
        other => Err(unexpected_payload(other)),
    }
}

pub async fn list_models(
    config: &Config,
    executor: Arc<dyn RequestExecutor>,
    category: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let models = fetch_models(config, executor).await?;

    println!("🤖 Available Models at {}", config.base_url());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if let Some(default_model) = &config.default_model {
        println!("🎯 Default model: {default_model} (from config)");
        println!();
    }

    let mut stdout = io::stdout();
    print_models(
        &mut stdout,
        &models,
        category.as_deref(),
        config.default_model.as_deref(),
    )?;
    Ok(())
}

/// Writes one entry per model, marking the default. Shared with `/models`.
pub fn print_models<W: Write>(
    out: &mut W,
    models: &[ModelConfig],
    category: Option<&str>,
    default_model: Option<&str>,
) -> io::Result<()> {
    let shown = filter_by_category(models, category);
    if shown.is_empty() {
        match category {
            Some(category) => writeln!(out, "No models found in category '{category}'.")?,
            None => writeln!(out, "No models found.")?,
        }
        return Ok(());
    }

    writeln!(out, "Found {} models:", shown.len())?;
    writeln!(out)?;
    for model in shown {
        if default_model == Some(model.id.as_str()) {
            writeln!(out, "  • {} (default)", model.id)?;
        } else {
            writeln!(out, "  • {}", model.id)?;
        }
        if !model.name.is_empty() && model.name != model.id {
            writeln!(out, "    Name: {}", model.name)?;
        }
        if !model.category.is_empty() {
            writeln!(out, "    Category: {}", model.category)?;
        }
        if !model.speed.is_empty() {
            writeln!(out, "    Speed: {}", model.speed)?;
        }
        if model.max_tokens > 0 {
            writeln!(out, "    Max tokens: {}", model.max_tokens)?;
        }
        if model.is_audio() {
            writeln!(out, "    Transcription only")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
