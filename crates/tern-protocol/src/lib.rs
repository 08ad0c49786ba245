//! Wire protocol and data model for Tern chat streams.
//!
//! The push stream is a sequence of named text frames
//! (`event: <type>\ndata: <payload>\n\n`). This crate owns the frame codec,
//! the event vocabulary with its payload encodings, and the message/session
//! types the client assembles frames into.

mod conversation;
mod event;
mod frame;
mod message;
mod request;

pub use conversation::{ApiEnvelope, Conversation, ConversationMessages, ConversationPatch};
pub use event::{AskUserPayload, ContentPayload, ErrorPayload, StreamEventKind};
pub use frame::{encode_frame, Frame, FrameDecoder, FrameEncodeError, DEFAULT_EVENT_NAME};
pub use message::{
    AskUserField, AskUserFieldType, AskUserForm, AskUserOption, AskUserStatus, ChatState, Message,
    MessageRole, StoredMessage, ThinkingLogEntry,
};
pub use request::ChatStreamRequest;
