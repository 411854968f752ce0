use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::RequestError;
use crate::core::executor::{BackendPayload, BackendRequest, RequestExecutor};
use crate::core::message::{Message, Role};
use crate::core::orchestrator::runtime::ChatRuntime;
use crate::core::orchestrator::{
    ChatActionDispatcher, ChatEvent, ChatEventSink, ChatOrchestrator, OrchestratorSettings,
};
use crate::core::presenter::CadenceScheduler;
use crate::core::session::ChatSession;
use crate::ui::markdown::PlainRenderer;

/// One canned executor response, consumed in order.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Payload(BackendPayload),
    Error(RequestError),
    /// Resolves only when the request's token is cancelled.
    Hang,
    Delayed(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    pub fn reply(content: impl Into<String>) -> Self {
        Self::Payload(BackendPayload::Reply(content.into()))
    }

    pub fn transcription(text: impl Into<String>) -> Self {
        Self::Payload(BackendPayload::Transcription(text.into()))
    }

    pub fn error(error: RequestError) -> Self {
        Self::Error(error)
    }
}

/// A [`RequestExecutor`] that records every request and answers from a
/// script. An exhausted script answers with a network error.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<ScriptedResponse>>,
    seen: Mutex<Vec<BackendRequest>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: BackendRequest,
        token: CancellationToken,
    ) -> Result<BackendPayload, RequestError> {
        self.seen.lock().unwrap().push(request);
        let mut next = self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            ScriptedResponse::Error(RequestError::Network("script exhausted".into()))
        });
        loop {
            match next {
                ScriptedResponse::Payload(payload) => return Ok(payload),
                ScriptedResponse::Error(error) => return Err(error),
                ScriptedResponse::Hang => {
                    token.cancelled().await;
                    return Err(RequestError::Cancelled);
                }
                ScriptedResponse::Delayed(delay, inner) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(RequestError::Cancelled),
                        _ = tokio::time::sleep(delay) => next = *inner,
                    }
                }
            }
        }
    }
}

pub fn create_test_orchestrator(settings: OrchestratorSettings) -> ChatOrchestrator {
    ChatOrchestrator::new(
        ChatSession::with_conversation_id("test-conversation"),
        settings,
        Arc::new(PlainRenderer),
    )
}

/// A runtime over a scripted executor with a zero-cadence reveal, plus the
/// receiving end of its event stream.
pub fn create_test_runtime(
    settings: OrchestratorSettings,
    executor: Arc<ScriptedExecutor>,
) -> (
    ChatRuntime,
    ChatActionDispatcher,
    mpsc::UnboundedReceiver<ChatEvent>,
) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let orchestrator =
        create_test_orchestrator(settings).with_events(ChatEventSink::new(events_tx));
    let (runtime, dispatcher) = ChatRuntime::new(
        orchestrator,
        executor,
        Arc::new(CadenceScheduler::new(Duration::ZERO)),
    );
    (runtime, dispatcher, events_rx)
}

pub fn drain_events(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn create_test_message(id: u64, role: Role, content: &str) -> Message {
    Message::new(id, role, content)
}

pub const SAMPLE_MARKDOWN_REPLY: &str = "Here is a quick example:\n\n```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n\nAnd a shell one:\n\n```\nls -la\n```\n";
