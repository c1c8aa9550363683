/// ChatLink - real-time chat client core
///
/// Conversation directory, per-conversation message stream, reactions and
/// typing presence on top of a REST backend and a STOMP-over-WebSocket broker.

pub mod api;
pub mod cli_app;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod model;
pub mod reactions;
pub mod session;
pub mod stream;
pub mod transport;
pub mod typing;

pub use config::Config;
pub use error::{ChatError, Result};
pub use session::ChatSession;
