pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod persistence;
pub mod presenter;
pub mod request_manager;
pub mod session;
