//! HTTP API handlers.

pub mod ask_api;
pub mod chat_api;
pub mod events_api;
pub mod export_api;
pub mod feedback_api;
pub mod key_api;
pub mod send_api;
