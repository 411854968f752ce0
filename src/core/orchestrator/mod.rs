//! Per-message chat state machine.
//!
//! The orchestrator is a synchronous reducer: inbound [`ChatAction`]s mutate
//! the session and may return a [`ChatCommand`] describing asynchronous work.
//! [`runtime::ChatRuntime`] executes commands on tokio tasks, which report
//! back by dispatching further actions. Only the runtime loop touches the
//! orchestrator, so session mutation is never concurrent.

mod reveal;
pub mod runtime;
mod sending;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::RequestError;
use crate::core::executor::{BackendPayload, BackendRequest};
use crate::core::message::Message;
use crate::core::persistence::{save_session, KeyValueStore};
use crate::core::presenter::Reveal;
use crate::core::request_manager::RequestManager;
use crate::core::session::{Attachment, ChatSession};
use crate::ui::markdown::{CodeBlock, MarkdownRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
    Errored,
}

pub enum ChatAction {
    Send {
        text: String,
    },
    Attach(Attachment),
    Retry {
        message_id: u64,
    },
    Cancel,
    Acknowledge,
    SelectModel {
        model_id: Option<String>,
    },
    Clear,
    RequestFinished {
        ticket: u64,
        outcome: Result<BackendPayload, RequestError>,
    },
    WatchdogExpired {
        ticket: u64,
    },
    RevealTick {
        ticket: u64,
    },
    Shutdown,
}

#[derive(Debug)]
pub struct SubmitParams {
    pub ticket: u64,
    pub key: String,
    pub request: BackendRequest,
    pub timeout: Duration,
    pub watchdog_timeout: Duration,
    pub watchdog: CancellationToken,
}

#[derive(Debug)]
pub enum ChatCommand {
    Submit(SubmitParams),
    ScheduleReveal {
        ticket: u64,
        token: CancellationToken,
    },
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageAppended {
        message: Message,
        markup: String,
    },
    ContentUpdated {
        message_id: u64,
        unit: String,
        markup: String,
    },
    RevealCompleted {
        message_id: u64,
        content: String,
        code_blocks: Vec<CodeBlock>,
    },
    MessageRemoved {
        message_id: u64,
    },
    AttachmentStaged {
        file_name: String,
        media_type: String,
    },
    LoadingChanged(bool),
    StateChanged(ChatState),
    Status(String),
    Cleared,
}

#[derive(Clone)]
pub struct ChatActionDispatcher {
    tx: mpsc::UnboundedSender<ChatAction>,
}

impl ChatActionDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<ChatAction>) -> Self {
        Self { tx }
    }

    pub fn dispatch(&self, action: ChatAction) {
        let _ = self.tx.send(action);
    }

    pub fn dispatch_many<I>(&self, actions: I)
    where
        I: IntoIterator<Item = ChatAction>,
    {
        for action in actions.into_iter() {
            self.dispatch(action);
        }
    }
}

#[derive(Clone, Default)]
pub struct ChatEventSink {
    tx: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl ChatEventSink {
    pub fn new(tx: mpsc::UnboundedSender<ChatEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub request_timeout: Duration,
    pub watchdog_timeout: Duration,
    pub history_window: usize,
    pub default_model: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        use crate::core::constants::{DEFAULT_HISTORY_WINDOW, DEFAULT_REQUEST_TIMEOUT_MS};
        let timeout = Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS);
        Self {
            request_timeout: timeout,
            watchdog_timeout: timeout,
            history_window: DEFAULT_HISTORY_WINDOW,
            default_model: None,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &crate::core::config::Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            watchdog_timeout: config.watchdog_timeout(),
            history_window: config.history_window(),
            default_model: config.default_model.clone(),
        }
    }
}

/// The backend operation behind an outstanding send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Chat,
    UploadAndChat,
    Transcribe,
}

impl Operation {
    fn key_prefix(self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::UploadAndChat => "upload",
            Operation::Transcribe => "transcribe",
        }
    }
}

pub(crate) struct InFlight {
    ticket: u64,
    key: String,
    operation: Operation,
    original_text: String,
    user_message_id: Option<u64>,
    watchdog: CancellationToken,
}

pub(crate) struct ActiveReveal {
    ticket: u64,
    message_id: u64,
    reveal: Reveal,
    token: CancellationToken,
}

pub struct ChatOrchestrator {
    session: ChatSession,
    state: ChatState,
    settings: OrchestratorSettings,
    requests: RequestManager<BackendPayload>,
    renderer: Arc<dyn MarkdownRenderer>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: ChatEventSink,
    in_flight: Option<InFlight>,
    reveal: Option<ActiveReveal>,
    next_ticket: u64,
}

impl ChatOrchestrator {
    pub fn new(
        session: ChatSession,
        settings: OrchestratorSettings,
        renderer: Arc<dyn MarkdownRenderer>,
    ) -> Self {
        Self {
            session,
            state: ChatState::Idle,
            settings,
            requests: RequestManager::new(),
            renderer,
            store: None,
            events: ChatEventSink::disconnected(),
            in_flight: None,
            reveal: None,
            next_ticket: 1,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, events: ChatEventSink) -> Self {
        self.events = events;
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn requests(&self) -> &RequestManager<BackendPayload> {
        &self.requests
    }

    /// No request outstanding and no reveal running.
    pub fn is_settled(&self) -> bool {
        self.in_flight.is_none() && self.reveal.is_none()
    }

    pub fn apply_action(&mut self, action: ChatAction) -> Option<ChatCommand> {
        match action {
            ChatAction::Send { text } => self.handle_send(text),
            ChatAction::Attach(attachment) => {
                self.stage_attachment(attachment);
                None
            }
            ChatAction::Retry { message_id } => self.handle_retry(message_id),
            ChatAction::Cancel => {
                self.cancel_pending();
                None
            }
            ChatAction::Acknowledge => {
                if self.state == ChatState::Errored {
                    self.set_state(ChatState::Idle);
                }
                None
            }
            ChatAction::SelectModel { model_id } => {
                self.session.selected_model = model_id;
                self.persist();
                None
            }
            ChatAction::Clear => {
                self.clear_session();
                None
            }
            ChatAction::RequestFinished { ticket, outcome } => {
                self.handle_request_finished(ticket, outcome)
            }
            ChatAction::WatchdogExpired { ticket } => {
                self.handle_watchdog(ticket);
                None
            }
            ChatAction::RevealTick { ticket } => self.handle_reveal_tick(ticket),
            ChatAction::Shutdown => {
                self.cancel_pending();
                None
            }
        }
    }

    fn stage_attachment(&mut self, attachment: Attachment) {
        self.events.emit(ChatEvent::AttachmentStaged {
            file_name: attachment.file_name.clone(),
            media_type: attachment.media_type.clone(),
        });
        self.session.pending_attachment = Some(attachment);
    }

    fn clear_session(&mut self) {
        self.requests.cancel_all();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.watchdog.cancel();
        }
        if let Some(active) = self.reveal.take() {
            active.token.cancel();
        }
        self.session.clear();
        self.set_loading(false);
        self.set_state(ChatState::Idle);
        self.events.emit(ChatEvent::Cleared);
        self.persist();
    }

    fn next_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    fn set_state(&mut self, state: ChatState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "chat state changed");
            self.state = state;
            self.events.emit(ChatEvent::StateChanged(state));
        }
    }

    fn set_loading(&mut self, loading: bool) {
        if self.session.loading != loading {
            self.session.loading = loading;
            self.events.emit(ChatEvent::LoadingChanged(loading));
        }
    }

    fn emit_appended(&self, message_id: u64) {
        if let Some(message) = self.session.message(message_id) {
            let markup = self.renderer.render(&message.content);
            self.events.emit(ChatEvent::MessageAppended {
                message: message.clone(),
                markup,
            });
        }
    }

    fn status(&self, text: impl Into<String>) {
        self.events.emit(ChatEvent::Status(text.into()));
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            save_session(store.as_ref(), &self.session);
        }
    }
}
