//! Drives a [`ChatOrchestrator`]: applies actions one at a time and runs the
//! commands they produce on tokio tasks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::{ChatAction, ChatActionDispatcher, ChatCommand, ChatOrchestrator, SubmitParams};
use crate::core::executor::RequestExecutor;
use crate::core::presenter::Scheduler;

pub struct ChatRuntime {
    orchestrator: ChatOrchestrator,
    executor: Arc<dyn RequestExecutor>,
    scheduler: Arc<dyn Scheduler>,
    dispatcher: ChatActionDispatcher,
    actions: mpsc::UnboundedReceiver<ChatAction>,
}

impl ChatRuntime {
    pub fn new(
        orchestrator: ChatOrchestrator,
        executor: Arc<dyn RequestExecutor>,
        scheduler: Arc<dyn Scheduler>,
    ) -> (Self, ChatActionDispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = ChatActionDispatcher::new(tx);
        let runtime = Self {
            orchestrator,
            executor,
            scheduler,
            dispatcher: dispatcher.clone(),
            actions: rx,
        };
        (runtime, dispatcher)
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.orchestrator
    }

    pub fn dispatcher(&self) -> ChatActionDispatcher {
        self.dispatcher.clone()
    }

    /// Processes actions until [`ChatAction::Shutdown`] arrives.
    pub async fn run(mut self) -> ChatOrchestrator {
        while let Some(action) = self.actions.recv().await {
            let shutdown = matches!(action, ChatAction::Shutdown);
            self.apply(action);
            if shutdown {
                break;
            }
        }
        self.orchestrator
    }

    /// Applies the next queued action. Returns `false` once the channel is
    /// closed or a shutdown was processed.
    pub async fn step(&mut self) -> bool {
        match self.actions.recv().await {
            Some(ChatAction::Shutdown) => {
                self.apply(ChatAction::Shutdown);
                false
            }
            Some(action) => {
                self.apply(action);
                true
            }
            None => false,
        }
    }

    /// Processes actions until no request is outstanding and no reveal is
    /// running.
    pub async fn settle(&mut self) {
        loop {
            if self.orchestrator.is_settled() {
                match self.actions.try_recv() {
                    Ok(action) => {
                        self.apply(action);
                        continue;
                    }
                    Err(_) => return,
                }
            }
            if !self.step().await {
                return;
            }
        }
    }

    pub fn apply(&mut self, action: ChatAction) {
        if let Some(command) = self.orchestrator.apply_action(action) {
            self.execute(command);
        }
    }

    fn execute(&self, command: ChatCommand) {
        match command {
            ChatCommand::Submit(params) => self.spawn_submit(params),
            ChatCommand::ScheduleReveal { ticket, token } => {
                let scheduler = Arc::clone(&self.scheduler);
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    scheduler.schedule_next().await;
                    if !token.is_cancelled() {
                        dispatcher.dispatch(ChatAction::RevealTick { ticket });
                    }
                });
            }
        }
    }

    fn spawn_submit(&self, params: SubmitParams) {
        let SubmitParams {
            ticket,
            key,
            request,
            timeout,
            watchdog_timeout,
            watchdog,
        } = params;

        let watchdog_dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watchdog.cancelled() => {}
                _ = tokio::time::sleep(watchdog_timeout) => {
                    watchdog_dispatcher.dispatch(ChatAction::WatchdogExpired { ticket });
                }
            }
        });

        debug!(ticket, key = %key, operation = request.operation_name(), "submitting");
        let executor = Arc::clone(&self.executor);
        let outcome = self
            .orchestrator
            .requests()
            .submit(&key, timeout, move |token| async move {
                executor.execute(request, token).await
            });
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let outcome = outcome.await;
            dispatcher.dispatch(ChatAction::RequestFinished { ticket, outcome });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ErrorKind, RequestError};
    use crate::core::executor::{BackendPayload, BackendRequest};
    use crate::core::message::Role;
    use crate::core::orchestrator::{ChatEvent, ChatState, OrchestratorSettings};
    use crate::core::session::Attachment;
    use crate::utils::test_utils::{
        create_test_runtime, drain_events, ScriptedExecutor, ScriptedResponse,
    };
    use std::time::Duration;

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            default_model: Some("llama-3.3-70b-versatile".to_string()),
            ..OrchestratorSettings::default()
        }
    }

    #[tokio::test]
    async fn hello_round_trip_reveals_reply() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::reply(
            "Hi! **there**",
        )]));
        let (mut runtime, dispatcher, mut events) =
            create_test_runtime(settings(), executor.clone());

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        match &requests[0] {
            BackendRequest::Chat(chat) => {
                assert_eq!(chat.message, "hello");
                assert!(chat.history.is_empty());
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let session = runtime.orchestrator().session();
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hi! **there**");
        assert!(messages[0].id < messages[1].id);
        assert_eq!(runtime.orchestrator().state(), ChatState::Idle);
        assert!(!runtime.orchestrator().is_loading());

        let events = drain_events(&mut events);
        let completions: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::RevealCompleted { .. }))
            .collect();
        assert_eq!(completions.len(), 1);
        let updates = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ContentUpdated { .. }))
            .count();
        assert_eq!(updates, "Hi! **there**".chars().count());
    }

    #[tokio::test]
    async fn audio_attachment_is_transcribed_without_chat() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            ScriptedResponse::transcription("spoken words"),
        ]));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor.clone());

        dispatcher.dispatch_many([
            ChatAction::Attach(Attachment::new("clip.wav", "audio/wav", vec![1, 2, 3])),
            ChatAction::Send {
                text: String::new(),
            },
        ]);
        runtime.settle().await;

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert!(matches!(requests[0], BackendRequest::Transcribe { .. }));

        let messages = runtime.orchestrator().session().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_attachment_placeholder());
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "spoken words");
        assert_eq!(runtime.orchestrator().state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn server_error_becomes_retryable_message() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::error(
            RequestError::ServerError {
                status: 500,
                detail: "boom".to_string(),
            },
        )]));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor);

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;

        let orchestrator = runtime.orchestrator();
        assert_eq!(orchestrator.state(), ChatState::Errored);
        assert!(!orchestrator.is_loading());
        let last = orchestrator.session().last_message().expect("error message");
        assert_eq!(last.content, "Server error 500: boom");
        let error = last.error.as_ref().expect("error annotation");
        assert!(error.retryable);
        assert_eq!(error.original_text.as_deref(), Some("hello"));
        assert_eq!(
            error.kind,
            ErrorKind::ServerError {
                status: 500,
                detail: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn retry_resubmits_original_text() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            ScriptedResponse::error(RequestError::Network("connection reset".to_string())),
            ScriptedResponse::reply("second time lucky"),
        ]));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor.clone());

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;
        let failed_id = runtime
            .orchestrator()
            .session()
            .last_message()
            .map(|m| m.id)
            .expect("failed message");

        dispatcher.dispatch(ChatAction::Retry {
            message_id: failed_id,
        });
        runtime.settle().await;

        assert_eq!(executor.requests().len(), 2);
        let messages = runtime.orchestrator().session().messages();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hello", "second time lucky"]);
        assert!(messages.iter().all(|m| !m.is_error()));
        assert_eq!(runtime.orchestrator().state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn retry_removes_only_the_failed_turn() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            ScriptedResponse::error(RequestError::Network("connection reset".to_string())),
            ScriptedResponse::reply("answer two"),
            ScriptedResponse::reply("answer three"),
        ]));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor.clone());

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;
        let failed_id = runtime
            .orchestrator()
            .session()
            .last_message()
            .map(|m| m.id)
            .expect("failed message");

        // The same text sent again by hand succeeds
        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;

        dispatcher.dispatch(ChatAction::Retry {
            message_id: failed_id,
        });
        runtime.settle().await;

        assert_eq!(executor.requests().len(), 3);
        let transcript: Vec<_> = runtime
            .orchestrator()
            .session()
            .messages()
            .iter()
            .map(|m| (m.id, m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            transcript,
            [
                (3, Role::User, "hello"),
                (4, Role::Assistant, "answer two"),
                (5, Role::User, "hello"),
                (6, Role::Assistant, "answer three"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_after_watchdog_is_dropped() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::Delayed(
            Duration::from_secs(1),
            Box::new(ScriptedResponse::reply("too late")),
        )]));
        let settings = OrchestratorSettings {
            request_timeout: Duration::from_secs(60),
            watchdog_timeout: Duration::from_millis(200),
            ..settings()
        };
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings, executor);

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        while let Ok(action) = runtime.actions.try_recv() {
            runtime.apply(action);
        }

        let orchestrator = runtime.orchestrator();
        assert!(orchestrator.is_settled());
        assert_eq!(orchestrator.state(), ChatState::Errored);
        let contents: Vec<_> = orchestrator
            .session()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["hello", "Request timed out"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_request_times_out_and_clears_loading() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::Hang]));
        let settings = OrchestratorSettings {
            request_timeout: Duration::from_millis(500),
            watchdog_timeout: Duration::from_millis(500),
            ..settings()
        };
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings, executor);

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;

        let orchestrator = runtime.orchestrator();
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.state(), ChatState::Errored);
        assert_eq!(orchestrator.requests().pending_count(), 0);
        let errors: Vec<_> = orchestrator
            .session()
            .messages()
            .iter()
            .filter(|m| m.is_error())
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error.as_ref().map(|e| e.kind.clone()),
            Some(ErrorKind::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_before_request_timeout() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::Hang]));
        let settings = OrchestratorSettings {
            request_timeout: Duration::from_secs(60),
            watchdog_timeout: Duration::from_millis(200),
            ..settings()
        };
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings, executor);

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        let start = tokio::time::Instant::now();
        runtime.settle().await;
        assert!(start.elapsed() < Duration::from_secs(60));

        let orchestrator = runtime.orchestrator();
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.requests().pending_count(), 0);
        let last = orchestrator.session().last_message().expect("timeout message");
        assert_eq!(last.content, "Request timed out");

        // The cancelled request still reports back; it must be ignored
        tokio::time::sleep(Duration::from_millis(10)).await;
        while let Ok(action) = runtime.actions.try_recv() {
            runtime.apply(action);
        }
        let errors = runtime
            .orchestrator()
            .session()
            .messages()
            .iter()
            .filter(|m| m.is_error())
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn history_window_sends_last_ten() {
        let responses = (0..8)
            .map(|i| ScriptedResponse::reply(&format!("r{i}")))
            .collect();
        let executor = Arc::new(ScriptedExecutor::new(responses));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor.clone());

        for i in 0..8 {
            dispatcher.dispatch(ChatAction::Send {
                text: format!("q{i}"),
            });
            runtime.settle().await;
        }

        // 14 messages precede the eighth question; only the last 10 are sent
        let requests = executor.requests();
        let BackendRequest::Chat(last) = requests.last().expect("request") else {
            panic!("expected a chat request");
        };
        assert_eq!(last.message, "q7");
        assert_eq!(last.history.len(), 10);
        let contents: Vec<_> = last.history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(
            contents,
            ["q2", "r2", "q3", "r3", "q4", "r4", "q5", "r5", "q6", "r6"]
        );

        let ids: Vec<u64> = runtime
            .orchestrator()
            .session()
            .messages()
            .iter()
            .map(|m| m.id)
            .collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn cancel_while_sending_surfaces_cancelled() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::Hang]));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor);

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        assert!(runtime.step().await);
        assert!(runtime.orchestrator().is_loading());

        runtime.apply(ChatAction::Cancel);
        runtime.settle().await;

        let orchestrator = runtime.orchestrator();
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.requests().pending_count(), 0);
        let last = orchestrator.session().last_message().expect("message");
        assert_eq!(last.content, "Request cancelled");
        assert_eq!(orchestrator.state(), ChatState::Errored);
    }

    #[tokio::test]
    async fn payload_for_unknown_shape_is_malformed() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedResponse::Payload(
            BackendPayload::Summary("unexpected".to_string()),
        )]));
        let (mut runtime, dispatcher, _events) = create_test_runtime(settings(), executor);

        dispatcher.dispatch(ChatAction::Send {
            text: "hello".to_string(),
        });
        runtime.settle().await;

        let last = runtime
            .orchestrator()
            .session()
            .last_message()
            .expect("message");
        assert_eq!(
            last.error.as_ref().map(|e| e.kind.clone()),
            Some(ErrorKind::MalformedResponse)
        );
    }
}
