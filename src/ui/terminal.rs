//! Line-oriented rendering of [`ChatEvent`]s for the REPL.

use std::io::{self, Write};

use crate::core::message::{Message, Role};
use crate::core::orchestrator::{ChatEvent, ChatState};
use crate::ui::markdown::CodeBlock;

pub struct TerminalView<W: Write> {
    out: W,
    revealing: Option<u64>,
    last_retryable: Option<u64>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            revealing: None,
            last_retryable: None,
        }
    }

    /// Id of the most recent failure that `/retry` can resend.
    pub fn last_retryable(&self) -> Option<u64> {
        self.last_retryable
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn handle(&mut self, event: &ChatEvent) -> io::Result<()> {
        match event {
            ChatEvent::MessageAppended { message, .. } => self.print_message(message)?,
            ChatEvent::ContentUpdated {
                message_id, unit, ..
            } => {
                if self.revealing != Some(*message_id) {
                    self.revealing = Some(*message_id);
                    write!(self.out, "{} ", role_label(Role::Assistant))?;
                }
                write!(self.out, "{unit}")?;
            }
            ChatEvent::RevealCompleted {
                message_id,
                code_blocks,
                ..
            } => {
                if self.revealing == Some(*message_id) {
                    writeln!(self.out)?;
                }
                self.revealing = None;
                self.print_code_blocks(code_blocks)?;
            }
            ChatEvent::MessageRemoved { message_id } => {
                if self.last_retryable == Some(*message_id) {
                    self.last_retryable = None;
                }
            }
            ChatEvent::AttachmentStaged {
                file_name,
                media_type,
            } => writeln!(
                self.out,
                "📎 Attached {file_name} ({media_type}); it is sent with your next message"
            )?,
            ChatEvent::LoadingChanged(true) => writeln!(self.out, "… waiting for a reply")?,
            ChatEvent::LoadingChanged(false) => {}
            ChatEvent::StateChanged(ChatState::Errored) => {
                writeln!(self.out, "Use /ack to dismiss or /retry to resend.")?
            }
            ChatEvent::StateChanged(_) => {}
            ChatEvent::Status(text) => writeln!(self.out, "ℹ️  {text}")?,
            ChatEvent::Cleared => {
                self.revealing = None;
                self.last_retryable = None;
                writeln!(self.out, "✅ Conversation cleared")?
            }
        }
        self.out.flush()
    }

    /// Prints a restored transcript at startup.
    pub fn print_transcript(&mut self, messages: &[Message]) -> io::Result<()> {
        for message in messages {
            self.print_message(message)?;
        }
        self.out.flush()
    }

    fn print_message(&mut self, message: &Message) -> io::Result<()> {
        if let Some(error) = &message.error {
            if error.retryable {
                self.last_retryable = Some(message.id);
                writeln!(
                    self.out,
                    "❌ {} (/retry {} to resend)",
                    message.content, message.id
                )
            } else {
                writeln!(self.out, "❌ {}", message.content)
            }
        } else if message.is_attachment_placeholder() {
            writeln!(self.out, "{}", message.content)
        } else if message.content.is_empty() {
            // Reveal target; content arrives through updates
            Ok(())
        } else {
            writeln!(
                self.out,
                "{} {}",
                role_label(message.role),
                message.content
            )
        }
    }

    fn print_code_blocks(&mut self, blocks: &[CodeBlock]) -> io::Result<()> {
        for block in blocks {
            let lines = block.content.lines().count();
            writeln!(
                self.out,
                "  [code block {}: {}, {} line{}]",
                block.index + 1,
                block.language.as_deref().unwrap_or("plain"),
                lines,
                if lines == 1 { "" } else { "s" }
            )?;
        }
        Ok(())
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you>",
        Role::Assistant => "bot>",
        Role::System => "sys>",
    }
}
