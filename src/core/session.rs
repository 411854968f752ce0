use std::path::Path;

use chrono::Utc;

use crate::api::HistoryEntry;
use crate::core::message::{AttachmentMarker, Message, MessageError, Role};

/// A file staged for the next send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(
        path: &Path,
        media_type: Option<String>,
    ) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = media_type.unwrap_or_else(|| guess_media_type(&file_name).to_string());
        Ok(Self::new(file_name, media_type, bytes))
    }

    pub fn is_audio(&self) -> bool {
        self.media_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("audio")
    }

    pub fn marker(&self) -> AttachmentMarker {
        AttachmentMarker {
            file_name: self.file_name.clone(),
            media_type: self.media_type.clone(),
        }
    }
}

pub fn guess_media_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "md" => "text/markdown",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Generates an opaque conversation id from 16 random bytes.
pub fn generate_conversation_id() -> String {
    let mut bytes = [0u8; 16];
    if getrandom::fill(&mut bytes).is_err() {
        // Fall back to the clock; uniqueness only matters per backend session
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        bytes[..8].copy_from_slice(&nanos.to_le_bytes());
    }
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct ChatSession {
    conversation_id: String,
    messages: Vec<Message>,
    pub loading: bool,
    pub pending_attachment: Option<Attachment>,
    pub selected_model: Option<String>,
    next_id: u64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_conversation_id(generate_conversation_id())
    }

    pub fn with_conversation_id(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            loading: false,
            pending_attachment: None,
            selected_model: None,
            next_id: 1,
        }
    }

    /// Rebuilds a session from persisted state. The id counter resumes after
    /// the highest restored id so ids stay strictly increasing.
    pub fn restore(conversation_id: impl Into<String>, messages: Vec<Message>) -> Self {
        let mut session = Self::with_conversation_id(conversation_id);
        session.next_id = messages.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        session.messages = messages;
        session
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: u64) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message::new(id, role, content));
        id
    }

    pub fn push_attachment_placeholder(&mut self, attachment: &Attachment) -> u64 {
        let id = self.push(Role::User, format!("📎 {}", attachment.file_name));
        if let Some(message) = self.messages.last_mut() {
            message.attachment = Some(attachment.marker());
        }
        id
    }

    pub fn push_error(&mut self, content: impl Into<String>, error: MessageError) -> u64 {
        let id = self.push(Role::System, content);
        if let Some(message) = self.messages.last_mut() {
            message.error = Some(error);
        }
        id
    }

    /// Appends to a message's content. Content only ever grows while a
    /// reveal is in progress.
    pub fn append_content(&mut self, id: u64, text: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Empties the transcript. The conversation id and the id counter are
    /// kept.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending_attachment = None;
        self.loading = false;
    }

    /// The trailing `window` plain messages, oldest first. Attachment
    /// placeholders and error annotations are never part of the history.
    pub fn history_window(&self, window: usize) -> Vec<HistoryEntry> {
        let eligible: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| !m.is_attachment_placeholder() && !m.is_error())
            .collect();
        let start = eligible.len().saturating_sub(window);
        eligible[start..]
            .iter()
            .map(|m| HistoryEntry {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                timestamp: m.created_at,
            })
            .collect()
    }
}
