use tracing::debug;

use super::{ChatCommand, ChatEvent, ChatOrchestrator};
use crate::core::presenter::RevealStep;
use crate::ui::markdown::extract_code_blocks;

impl ChatOrchestrator {
    pub(super) fn handle_reveal_tick(&mut self, ticket: u64) -> Option<ChatCommand> {
        let Some(active) = self.reveal.as_mut() else {
            return None;
        };
        if active.ticket != ticket || active.token.is_cancelled() {
            return None;
        }

        let message_id = active.message_id;
        match active.reveal.step() {
            RevealStep::Unit(unit) => {
                let finished = active.reveal.is_finished();
                self.append_unit(message_id, unit);
                if finished {
                    self.complete_reveal();
                    None
                } else {
                    let token = self.reveal.as_ref().map(|active| active.token.clone())?;
                    Some(ChatCommand::ScheduleReveal { ticket, token })
                }
            }
            RevealStep::Done => {
                self.complete_reveal();
                None
            }
        }
    }

    /// Stops the running reveal. The remainder is appended at once so the
    /// stored message always holds the full response.
    pub(super) fn stop_reveal(&mut self) {
        let Some(active) = self.reveal.as_mut() else {
            return;
        };
        active.token.cancel();
        let message_id = active.message_id;
        let remainder = active.reveal.cancel();
        debug!(message_id, "reveal cancelled");
        if !remainder.is_empty() {
            self.append_unit(message_id, remainder);
        }
        self.complete_reveal();
    }

    fn append_unit(&mut self, message_id: u64, unit: String) {
        if !self.session.append_content(message_id, &unit) {
            return;
        }
        let markup = self
            .session
            .message(message_id)
            .map(|message| self.renderer.render(&message.content))
            .unwrap_or_default();
        self.events.emit(ChatEvent::ContentUpdated {
            message_id,
            unit,
            markup,
        });
    }

    fn complete_reveal(&mut self) {
        let Some(active) = self.reveal.take() else {
            return;
        };
        let content = self
            .session
            .message(active.message_id)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let code_blocks = extract_code_blocks(&content);
        debug!(
            message_id = active.message_id,
            code_blocks = code_blocks.len(),
            "reveal complete"
        );
        self.events.emit(ChatEvent::RevealCompleted {
            message_id: active.message_id,
            content,
            code_blocks,
        });
        self.finish_idle();
    }
}
