//! Wire payloads exchanged with the inference backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod models;

/// One entry of the trailing history window sent with a chat turn.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub response: ChatReply,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    #[serde(default)]
    pub model_used: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Structured error body returned for non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

/// Extracts the `detail` field from an error body, falling back to an empty
/// string when the body is not the expected shape.
pub fn parse_error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(text),
        }) => text,
        Ok(ErrorBody { detail }) if !detail.is_null() => detail.to_string(),
        _ => String::new(),
    }
}
