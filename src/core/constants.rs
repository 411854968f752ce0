//! Shared constants used across the application

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Bounds each backend request and, unless configured separately, the
/// loading watchdog.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_REVEAL_CADENCE_MS: u64 = 10;

/// Trailing messages sent with each chat turn.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

pub const STORE_KEY_MESSAGES: &str = "parley.messages";
pub const STORE_KEY_SELECTED_MODEL: &str = "parley.selected_model";
pub const STORE_KEY_CONVERSATION_ID: &str = "parley.conversation_id";
