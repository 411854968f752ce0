use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    ActiveReveal, ChatCommand, ChatEvent, ChatOrchestrator, ChatState, InFlight, Operation,
    SubmitParams,
};
use crate::api::ChatRequest;
use crate::core::error::RequestError;
use crate::core::executor::{BackendPayload, BackendRequest};
use crate::core::message::{MessageError, Role};
use crate::core::presenter::{CancelPolicy, Reveal};
use crate::core::session::Attachment;

impl ChatOrchestrator {
    pub(super) fn handle_send(&mut self, text: String) -> Option<ChatCommand> {
        let attachment = self.session.pending_attachment.take();
        self.begin_send(text, attachment)
    }

    pub(super) fn handle_retry(&mut self, message_id: u64) -> Option<ChatCommand> {
        if matches!(self.state, ChatState::Sending | ChatState::Streaming) {
            self.status("Wait for the current response before retrying");
            return None;
        }

        let (original_text, user_message_id) = match self.session.message(message_id) {
            Some(message) if message.is_retryable() => {
                let error = message.error.as_ref();
                (
                    error
                        .and_then(|error| error.original_text.clone())
                        .unwrap_or_default(),
                    error.and_then(|error| error.user_message_id),
                )
            }
            Some(_) => {
                self.status(format!("Message {message_id} cannot be retried"));
                return None;
            }
            None => {
                self.status(format!("No message with id {message_id}"));
                return None;
            }
        };

        self.remove_message(message_id);
        // The resend pushes the turn again
        if let Some(id) = user_message_id {
            self.remove_message(id);
        }

        // Attachments are never retried, so any staged file stays staged
        self.begin_send(original_text, None)
    }

    fn begin_send(&mut self, text: String, attachment: Option<Attachment>) -> Option<ChatCommand> {
        if matches!(self.state, ChatState::Sending | ChatState::Streaming) {
            if attachment.is_some() {
                self.session.pending_attachment = attachment;
            }
            self.status("A response is still in progress");
            return None;
        }

        let text = text.trim().to_string();
        let model_id = self
            .session
            .selected_model
            .clone()
            .or_else(|| self.settings.default_model.clone());

        if text.is_empty() && attachment.is_none() && model_id.is_none() {
            self.reject(RequestError::Validation(
                "Type a message, attach a file, or select a model".to_string(),
            ));
            return None;
        }

        let is_audio = attachment.as_ref().is_some_and(Attachment::is_audio);
        let model_id = match model_id {
            Some(model_id) => model_id,
            None if is_audio => String::new(),
            None => {
                self.session.pending_attachment = attachment;
                self.reject(RequestError::Validation(
                    "No model selected; use /model <id> first".to_string(),
                ));
                return None;
            }
        };

        // Sending from Errored acknowledges the previous failure
        if self.state == ChatState::Errored {
            self.set_state(ChatState::Idle);
        }

        let mut user_message_id = None;
        let (operation, request) = match attachment {
            Some(audio) if is_audio => {
                if !text.is_empty() {
                    self.status("Typed text is not sent with an audio transcription");
                }
                let id = self.session.push_attachment_placeholder(&audio);
                self.emit_appended(id);
                (Operation::Transcribe, BackendRequest::Transcribe { audio })
            }
            Some(file) => {
                let id = self.session.push_attachment_placeholder(&file);
                self.emit_appended(id);
                if !text.is_empty() {
                    let id = self.session.push(Role::User, text.clone());
                    self.emit_appended(id);
                    user_message_id = Some(id);
                }
                (
                    Operation::UploadAndChat,
                    BackendRequest::UploadAndChat {
                        file,
                        message: text.clone(),
                        model_id,
                    },
                )
            }
            None => {
                // History is captured before the new turn is appended
                let history = self.session.history_window(self.settings.history_window);
                let id = self.session.push(Role::User, text.clone());
                self.emit_appended(id);
                user_message_id = Some(id);
                (
                    Operation::Chat,
                    BackendRequest::Chat(ChatRequest {
                        model_id,
                        message: text.clone(),
                        conversation_id: Some(self.session.conversation_id().to_string()),
                        history,
                    }),
                )
            }
        };

        let ticket = self.next_ticket();
        let key = format!(
            "{}-{}",
            operation.key_prefix(),
            Utc::now().timestamp_millis()
        );
        let watchdog = CancellationToken::new();
        self.in_flight = Some(InFlight {
            ticket,
            key: key.clone(),
            operation,
            original_text: text,
            user_message_id,
            watchdog: watchdog.clone(),
        });

        self.set_loading(true);
        self.set_state(ChatState::Sending);
        self.persist();
        debug!(ticket, key = %key, ?operation, "send started");

        Some(ChatCommand::Submit(SubmitParams {
            ticket,
            key,
            request,
            timeout: self.settings.request_timeout,
            watchdog_timeout: self.settings.watchdog_timeout,
            watchdog,
        }))
    }

    pub(super) fn handle_request_finished(
        &mut self,
        ticket: u64,
        outcome: Result<BackendPayload, RequestError>,
    ) -> Option<ChatCommand> {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => in_flight,
            other => {
                debug!(ticket, "ignoring stale request outcome");
                self.in_flight = other;
                return None;
            }
        };
        in_flight.watchdog.cancel();

        match (in_flight.operation, outcome) {
            (Operation::Transcribe, Ok(BackendPayload::Transcription(text))) => {
                let id = self.session.push(Role::Assistant, text);
                self.emit_appended(id);
                self.finish_idle();
                None
            }
            (Operation::Chat | Operation::UploadAndChat, Ok(BackendPayload::Reply(content))) => {
                self.start_reveal(ticket, &content)
            }
            (_, Ok(other)) => {
                let error = RequestError::MalformedResponse(format!(
                    "unexpected payload for {:?}: {other:?}",
                    in_flight.operation
                ));
                self.fail(&in_flight, error);
                None
            }
            (_, Err(error)) => {
                self.fail(&in_flight, error);
                None
            }
        }
    }

    pub(super) fn handle_watchdog(&mut self, ticket: u64) {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => in_flight,
            other => {
                self.in_flight = other;
                return;
            }
        };
        warn!(ticket, key = %in_flight.key, "watchdog expired; abandoning request");
        self.requests.cancel(&in_flight.key);
        self.fail(&in_flight, RequestError::Timeout);
    }

    /// Cancels the outstanding send and stops any running reveal.
    pub(super) fn cancel_pending(&mut self) {
        let cancelled = self.requests.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled pending requests");
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.watchdog.cancel();
            self.fail(&in_flight, RequestError::Cancelled);
        }
        if self.reveal.is_some() {
            self.stop_reveal();
        }
        self.set_loading(false);
    }

    fn start_reveal(&mut self, ticket: u64, content: &str) -> Option<ChatCommand> {
        let message_id = self.session.push(Role::Assistant, String::new());
        self.emit_appended(message_id);

        let token = CancellationToken::new();
        self.reveal = Some(ActiveReveal {
            ticket,
            message_id,
            reveal: Reveal::new(content, CancelPolicy::FinalizeFull),
            token: token.clone(),
        });
        self.set_state(ChatState::Streaming);
        Some(ChatCommand::ScheduleReveal { ticket, token })
    }

    fn fail(&mut self, in_flight: &InFlight, error: RequestError) {
        warn!(key = %in_flight.key, error = %error, "request failed");
        let retryable = in_flight.operation == Operation::Chat;
        let id = self.session.push_error(
            error.to_string(),
            MessageError {
                kind: error.kind(),
                retryable,
                original_text: retryable.then(|| in_flight.original_text.clone()),
                user_message_id: in_flight.user_message_id,
            },
        );
        self.emit_appended(id);
        self.set_loading(false);
        self.set_state(ChatState::Errored);
        self.persist();
    }

    fn reject(&self, error: RequestError) {
        debug!(error = %error, "send rejected");
        self.status(error.to_string());
    }

    fn remove_message(&mut self, message_id: u64) {
        if self.session.remove(message_id).is_some() {
            self.events.emit(ChatEvent::MessageRemoved { message_id });
        }
    }

    pub(super) fn finish_idle(&mut self) {
        self.set_loading(false);
        self.set_state(ChatState::Idle);
        self.persist();
    }
}
