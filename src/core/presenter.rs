//! Progressive reveal of an already-complete response.
//!
//! [`Reveal`] is the pure state machine: one grapheme per step, plus the
//! cancellation policy. [`StreamPresenter`] drives it with a [`Scheduler`]
//! and a markdown renderer. The chat orchestrator drives the same state
//! machine from its action loop instead, one tick per scheduled action.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;

use crate::ui::markdown::MarkdownRenderer;

/// What happens to the unrevealed remainder when a reveal is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Append the remainder at once so no content is lost.
    #[default]
    FinalizeFull,
    /// Keep only what was already revealed.
    StopAtPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealStep {
    /// One more unit became visible.
    Unit(String),
    /// The reveal was already complete.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    units: Vec<String>,
    revealed: usize,
    policy: CancelPolicy,
    finished: bool,
}

impl Reveal {
    pub fn new(full_text: &str, policy: CancelPolicy) -> Self {
        Self {
            units: full_text.graphemes(true).map(str::to_string).collect(),
            revealed: 0,
            policy,
            finished: false,
        }
    }

    pub fn step(&mut self) -> RevealStep {
        if self.finished {
            return RevealStep::Done;
        }
        match self.units.get(self.revealed) {
            Some(unit) => {
                self.revealed += 1;
                if self.revealed == self.units.len() {
                    self.finished = true;
                }
                RevealStep::Unit(unit.clone())
            }
            None => {
                self.finished = true;
                RevealStep::Done
            }
        }
    }

    /// Stops the reveal. Returns the text that still has to be appended
    /// under the reveal's policy (empty for [`CancelPolicy::StopAtPrefix`]).
    pub fn cancel(&mut self) -> String {
        if self.finished {
            return String::new();
        }
        self.finished = true;
        match self.policy {
            CancelPolicy::FinalizeFull => {
                let remainder = self.units[self.revealed..].concat();
                self.revealed = self.units.len();
                remainder
            }
            CancelPolicy::StopAtPrefix => String::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn revealed_units(&self) -> usize {
        self.revealed
    }

    pub fn total_units(&self) -> usize {
        self.units.len()
    }

    pub fn revealed_text(&self) -> String {
        self.units[..self.revealed].concat()
    }
}

/// Yields the slot for the next reveal tick. A tick is only scheduled after
/// the previous one was applied, so reveal speed follows rendering cost.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_next(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct CadenceScheduler {
    cadence: Duration,
}

impl CadenceScheduler {
    pub fn new(cadence: Duration) -> Self {
        Self { cadence }
    }
}

#[async_trait]
impl Scheduler for CadenceScheduler {
    async fn schedule_next(&self) {
        if self.cadence.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.cadence).await;
        }
    }
}

/// Progress reported after every revealed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealUpdate {
    pub unit: String,
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealCompletion {
    pub content: String,
    pub cancelled: bool,
}

pub struct StreamPresenter {
    scheduler: Arc<dyn Scheduler>,
    renderer: Arc<dyn MarkdownRenderer>,
}

impl StreamPresenter {
    pub fn new(scheduler: Arc<dyn Scheduler>, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self {
            scheduler,
            renderer,
        }
    }

    /// Reveals `full_text` unit by unit, re-rendering the accumulated
    /// prefix after each one. The token is checked before every step.
    /// Returns once, after the last unit or after cancellation.
    pub async fn present<F>(
        &self,
        full_text: &str,
        policy: CancelPolicy,
        token: &CancellationToken,
        mut on_update: F,
    ) -> RevealCompletion
    where
        F: FnMut(RevealUpdate) + Send,
    {
        let mut reveal = Reveal::new(full_text, policy);
        let mut content = String::with_capacity(full_text.len());

        loop {
            if token.is_cancelled() {
                let remainder = reveal.cancel();
                if !remainder.is_empty() {
                    content.push_str(&remainder);
                    on_update(RevealUpdate {
                        unit: remainder,
                        markup: self.renderer.render(&content),
                    });
                }
                return RevealCompletion {
                    content,
                    cancelled: true,
                };
            }

            match reveal.step() {
                RevealStep::Unit(unit) => {
                    content.push_str(&unit);
                    on_update(RevealUpdate {
                        unit,
                        markup: self.renderer.render(&content),
                    });
                }
                RevealStep::Done => break,
            }

            if reveal.is_finished() {
                break;
            }
            self.scheduler.schedule_next().await;
        }

        RevealCompletion {
            content,
            cancelled: false,
        }
    }
}
