use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::constants::{
    DEFAULT_BASE_URL, DEFAULT_HISTORY_WINDOW, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_REVEAL_CADENCE_MS,
};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend root, e.g. "http://localhost:8000"
    pub base_url: Option<String>,
    /// Model used when no model has been selected in the session
    pub default_model: Option<String>,
    /// Upper bound for a single backend request
    pub request_timeout_ms: Option<u64>,
    /// Maximum wait before the loading state is forcibly cleared
    pub watchdog_timeout_ms: Option<u64>,
    /// Delay between revealed characters
    pub reveal_cadence_ms: Option<u64>,
    /// Number of trailing messages sent as chat history
    pub history_window: Option<usize>,
    /// Render assistant content as markdown
    pub markdown: Option<bool>,
    /// Persist the transcript between runs
    pub persist: Option<bool>,
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }

    /// The watchdog shares the request timeout unless configured separately.
    pub fn watchdog_timeout(&self) -> Duration {
        self.watchdog_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.request_timeout())
    }

    pub fn reveal_cadence(&self) -> Duration {
        Duration::from_millis(self.reveal_cadence_ms.unwrap_or(DEFAULT_REVEAL_CADENCE_MS))
    }

    pub fn history_window(&self) -> usize {
        self.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW)
    }

    pub fn markdown_enabled(&self) -> bool {
        self.markdown.unwrap_or(true)
    }

    pub fn persist_enabled(&self) -> bool {
        self.persist.unwrap_or(true)
    }
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
