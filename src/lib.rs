//! Parley is a terminal chat client for a backend that fronts several
//! language models.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the request pipeline: deduplicated, time-bounded requests
//!   ([`core::request_manager`]), the HTTP executor with failure
//!   classification ([`core::executor`]), progressive reveal
//!   ([`core::presenter`]) and the chat state machine
//!   ([`core::orchestrator`]).
//! - [`ui`] renders markdown and prints orchestrator events line by line.
//! - [`commands`] parses slash commands typed into the chat.
//! - [`api`] defines the wire payloads exchanged with the backend.
//!
//! The binary routes through [`crate::cli::main`], which loads configuration
//! and dispatches to the interactive chat or to a one-shot subcommand.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
