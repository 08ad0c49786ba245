//! Folds the frame sequence of one stream into an assistant [`Message`].

use std::fmt::Display;

use tern_core::current_unix_timestamp_ms;
use tern_protocol::{
    AskUserPayload, ChatState, ContentPayload, ErrorPayload, Frame, Message, StreamEventKind,
    ThinkingLogEntry,
};

use crate::SessionGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `TerminalReason` values.
pub enum TerminalReason {
    Done,
    BackendError,
    TransportError,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `AssemblerPhase` values.
pub enum AssemblerPhase {
    Idle,
    Streaming { thinking: bool },
    Terminal(TerminalReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of feeding one frame or signal to the assembler.
pub enum FrameOutcome {
    Applied,
    Terminal(TerminalReason),
    /// Nothing changed: unknown event, not streaming, or already terminal.
    Ignored,
}

#[derive(Debug, Clone)]
/// State machine owning one in-flight assistant message.
pub struct MessageAssembler {
    message: Message,
    phase: AssemblerPhase,
}

impl MessageAssembler {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            phase: AssemblerPhase::Idle,
        }
    }

    /// Creates an assembler that is already streaming into `message`.
    pub fn start(message: Message) -> Self {
        let mut assembler = Self::new(message);
        assembler.begin();
        assembler
    }

    /// Moves `Idle` to `Streaming`; any other phase is left as is.
    pub fn begin(&mut self) -> bool {
        if self.phase != AssemblerPhase::Idle {
            return false;
        }
        self.phase = AssemblerPhase::Streaming { thinking: false };
        true
    }

    pub fn phase(&self) -> AssemblerPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, AssemblerPhase::Terminal(_))
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn apply_frame(&mut self, frame: &Frame, state: &mut ChatState) -> FrameOutcome {
        if !matches!(self.phase, AssemblerPhase::Streaming { .. }) {
            tracing::debug!(
                event = %frame.event,
                message_id = %self.message.id,
                "ignoring frame outside of streaming phase"
            );
            return FrameOutcome::Ignored;
        }

        let kind = frame.kind();
        match kind {
            StreamEventKind::Content => {
                let text = ContentPayload::decode(&frame.data).into_text();
                self.message.content.push_str(&text);
                self.set_thinking(false);
                FrameOutcome::Applied
            }
            StreamEventKind::Thinking
            | StreamEventKind::ToolCall
            | StreamEventKind::ToolResult
            | StreamEventKind::ToolError => {
                self.message.thinking_log.push(ThinkingLogEntry {
                    timestamp: current_unix_timestamp_ms(),
                    event_type: frame.event.clone(),
                    raw_data: frame.data.clone(),
                });
                self.set_thinking(true);
                FrameOutcome::Applied
            }
            StreamEventKind::AskUser => {
                match AskUserPayload::decode(&frame.data) {
                    Ok(payload) => self.message.ask_user = Some(payload.into_form()),
                    Err(error) => tracing::warn!(
                        message_id = %self.message.id,
                        error = %error,
                        "ignoring malformed ask_user payload"
                    ),
                }
                self.set_thinking(false);
                FrameOutcome::Applied
            }
            StreamEventKind::Done => self.finish(TerminalReason::Done, state),
            StreamEventKind::Error => {
                let error = ErrorPayload::decode(&frame.data).message;
                self.append_diagnostic(&error);
                state.error = Some(error);
                self.finish(TerminalReason::BackendError, state)
            }
            StreamEventKind::Other(name) => {
                tracing::debug!(event = %name, "ignoring unrecognized stream event");
                FrameOutcome::Ignored
            }
        }
    }

    /// Finalizes the message after a connection fault, appending `error` to its content.
    pub fn fail_transport(&mut self, error: impl Display, state: &mut ChatState) -> FrameOutcome {
        if self.is_terminal() {
            return FrameOutcome::Ignored;
        }
        let error = error.to_string();
        self.append_diagnostic(&error);
        state.error = Some(error);
        self.finish(TerminalReason::TransportError, state)
    }

    /// Finalizes the message on caller abort; content received so far is kept.
    pub fn cancel(&mut self, state: &mut ChatState) -> FrameOutcome {
        if self.is_terminal() {
            return FrameOutcome::Ignored;
        }
        self.finish(TerminalReason::Cancelled, state)
    }

    fn set_thinking(&mut self, thinking: bool) {
        self.message.is_thinking = thinking;
        self.phase = AssemblerPhase::Streaming { thinking };
    }

    fn append_diagnostic(&mut self, text: &str) {
        self.message.content.push('\n');
        self.message.content.push_str(text);
    }

    fn finish(&mut self, reason: TerminalReason, state: &mut ChatState) -> FrameOutcome {
        self.message.is_thinking = false;
        self.phase = AssemblerPhase::Terminal(reason);
        SessionGuard::release(state);
        tracing::debug!(message_id = %self.message.id, reason = ?reason, "assistant message finalized");
        FrameOutcome::Terminal(reason)
    }
}
