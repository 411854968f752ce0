//! Presentation helpers: markdown rendering and the line-oriented terminal
//! view used by the REPL. Domain state lives in [`crate::core`].

pub mod markdown;
pub mod terminal;
