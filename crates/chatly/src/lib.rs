//! Chatly: a persona-based chat service with streamed completions and
//! feedback-driven prompt rules.
//!
//! A send runs through the [`pipeline::MessagePipeline`]: the user message
//! is persisted optimistically, the completion backend is picked from the
//! shape of the caller's credential ([`backend::CompletionBackend`]), and
//! the reply streams back fragment by fragment before being persisted.
//! Feedback on replies accumulates in a per-user rulebook that
//! [`ruleset::render_ruleset`] folds into every prompt.

pub mod api;
pub mod app_state;
pub mod backend;
pub mod completion;
pub mod config;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod ruleset;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod transcript;

pub use app_state::AppState;
pub use backend::CompletionBackend;
pub use config::Config;
pub use error::ChatError;
pub use pipeline::{MessagePipeline, SendEvent};
pub use server::run_server;
pub use store::ChatDatabase;
