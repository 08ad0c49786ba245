//! HTTP gateway hosting the reference chat-stream emitter and conversation routes.
pub mod gateway_server;
pub mod reference_emitter;

pub use gateway_server::*;
pub use reference_emitter::*;
