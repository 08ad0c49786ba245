//! Client side of the Tern chat stream.
//!
//! [`StreamTransport`] opens one push connection per request and yields
//! decoded frames, [`MessageAssembler`] folds them into an assistant message,
//! and [`ChatSession`] wires both together behind a [`SessionGuard`] so a
//! session never assembles two replies at once.

mod assembler;
mod chat_session;
mod conversation_api;
mod error;
mod guard;
mod identity;
mod transport;

pub use assembler::{AssemblerPhase, FrameOutcome, MessageAssembler, TerminalReason};
pub use chat_session::{ChatSession, HistorySource, StreamOutcome};
pub use conversation_api::{ConversationApiClient, ConversationApiConfig};
pub use error::TernClientError;
pub use guard::{GuardRejected, SessionGuard};
pub use identity::{AnonymousIdentityProvider, IdentityKind, IdentityProvider, UserIdentity};
pub use transport::{
    AbortSignal, FrameStream, StreamTransport, StreamTransportConfig, TransportEvent,
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_STREAM_PATH,
    USER_ID_HEADER,
};
