//! Session-level chat driver: guard, transport, and assembler wired together.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tern_protocol::{ChatState, ChatStreamRequest, Message, StoredMessage};
use tokio::sync::watch;

use crate::{
    AbortSignal, FrameOutcome, FrameStream, MessageAssembler, SessionGuard, StreamTransport,
    TerminalReason, TernClientError, TransportEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// How a `stream_message` call ended.
pub enum StreamOutcome {
    Completed,
    /// The stream ended in a backend `error` frame or a transport fault.
    Failed(String),
    Cancelled,
    /// Nothing was started: the session was busy or the text was blank.
    Rejected,
}

#[async_trait]
/// Trait contract for stored message history lookups.
pub trait HistorySource: Send + Sync {
    async fn load_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, TernClientError>;
}

#[derive(Debug)]
struct InFlight {
    stream_id: u64,
    assembler: MessageAssembler,
    abort: AbortSignal,
}

#[derive(Debug, Default)]
struct SessionState {
    history: Vec<Message>,
    chat: ChatState,
    in_flight: Option<InFlight>,
    next_stream_id: u64,
    /// Bumped by every change that invalidates a pending history load.
    load_generation: u64,
}

#[derive(Debug)]
struct StartedStream {
    stream_id: u64,
    abort: AbortSignal,
    request: ChatStreamRequest,
}

#[derive(Debug, Clone)]
/// Cloneable handle to one chat session.
///
/// The shared state is only locked between awaits, once per frame, so a
/// clone can cancel or inspect the session while a stream is running.
pub struct ChatSession {
    transport: StreamTransport,
    state: Arc<Mutex<SessionState>>,
    assistant_updates: Arc<watch::Sender<Option<Message>>>,
}

impl ChatSession {
    pub fn new(transport: StreamTransport) -> Self {
        let (assistant_updates, _) = watch::channel(None);
        Self {
            transport,
            state: Arc::new(Mutex::new(SessionState::default())),
            assistant_updates: Arc::new(assistant_updates),
        }
    }

    /// Watches the assistant message of the current or most recent stream.
    ///
    /// A new value is published on stream start, on every applied frame and
    /// when the message is finalized; `clear_messages` publishes `None`.
    pub fn subscribe_assistant(&self) -> watch::Receiver<Option<Message>> {
        self.assistant_updates.subscribe()
    }

    fn publish_assistant(&self, message: Option<Message>) {
        self.assistant_updates.send_replace(message);
    }

    pub fn transport(&self) -> &StreamTransport {
        &self.transport
    }

    pub fn state(&self) -> ChatState {
        lock_or_recover(&self.state).chat.clone()
    }

    /// History followed by the in-flight assistant message, if any.
    pub fn messages(&self) -> Vec<Message> {
        let state = lock_or_recover(&self.state);
        let mut messages = state.history.clone();
        if let Some(in_flight) = state.in_flight.as_ref() {
            messages.push(in_flight.assembler.message().clone());
        }
        messages
    }

    /// Sends `text` and assembles the reply until the stream terminates.
    pub async fn stream_message(&self, text: &str, conversation_id: Option<&str>) -> StreamOutcome {
        let Some(started) = self.begin(text, conversation_id) else {
            return StreamOutcome::Rejected;
        };

        match self
            .transport
            .open(&started.request, started.abort.clone())
            .await
        {
            Ok(frames) => self.drive(started.stream_id, frames).await,
            Err(error) => {
                if self.fail_in_flight(started.stream_id, &error) {
                    StreamOutcome::Failed(error.to_string())
                } else {
                    StreamOutcome::Cancelled
                }
            }
        }
    }

    /// Aborts the in-flight stream. Returns `false` when nothing was streaming.
    pub fn cancel(&self) -> bool {
        let mut state = lock_or_recover(&self.state);
        let SessionState {
            history,
            chat,
            in_flight,
            ..
        } = &mut *state;
        let Some(mut current) = in_flight.take() else {
            return false;
        };
        current.abort.abort();
        current.assembler.cancel(chat);
        tracing::info!(
            stream_id = current.stream_id,
            message_id = %current.assembler.message().id,
            "chat stream cancelled"
        );
        let message = current.assembler.into_message();
        self.publish_assistant(Some(message.clone()));
        history.push(message);
        true
    }

    /// Replaces the history with the stored messages of `conversation_id`.
    ///
    /// Replayed messages never carry thinking state. Fails with
    /// [`TernClientError::SessionBusy`] while a stream or another load is running,
    /// and with [`TernClientError::HistoryLoadSuperseded`] when the session was
    /// cleared while the source was answering; the result is then discarded.
    pub async fn load_history(
        &self,
        source: &dyn HistorySource,
        conversation_id: &str,
    ) -> Result<usize, TernClientError> {
        let generation = {
            let mut state = lock_or_recover(&self.state);
            if !SessionGuard::can_start(&state.chat) {
                return Err(TernClientError::SessionBusy);
            }
            state.chat.is_loading = true;
            state.chat.error = None;
            state.load_generation = state.load_generation.wrapping_add(1);
            state.load_generation
        };

        let loaded = source.load_messages(conversation_id).await;

        let mut state = lock_or_recover(&self.state);
        if state.load_generation != generation {
            tracing::debug!(
                conversation_id = %conversation_id,
                "discarding superseded history load"
            );
            return Err(TernClientError::HistoryLoadSuperseded);
        }
        state.chat.is_loading = false;
        match loaded {
            Ok(stored) => {
                state.history = stored.into_iter().map(Message::from_stored).collect();
                tracing::debug!(
                    conversation_id = %conversation_id,
                    messages = state.history.len(),
                    "loaded conversation history"
                );
                Ok(state.history.len())
            }
            Err(error) => {
                state.chat.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Drops all messages and aborts any in-flight stream.
    pub fn clear_messages(&self) {
        let mut state = lock_or_recover(&self.state);
        if let Some(current) = state.in_flight.take() {
            current.abort.abort();
        }
        state.history.clear();
        state.chat = ChatState::default();
        state.load_generation = state.load_generation.wrapping_add(1);
        self.publish_assistant(None);
    }

    /// Answers the pending form on message `message_id`.
    pub fn finish_ask_user(&self, message_id: &str, answers: &BTreeMap<String, String>) -> bool {
        let mut state = lock_or_recover(&self.state);
        state
            .history
            .iter_mut()
            .find(|message| message.id == message_id)
            .is_some_and(|message| message.finish_ask_user(answers))
    }

    fn begin(&self, text: &str, conversation_id: Option<&str>) -> Option<StartedStream> {
        if text.trim().is_empty() {
            tracing::debug!("ignoring blank chat message");
            return None;
        }

        let mut state = lock_or_recover(&self.state);
        if SessionGuard::acquire(&mut state.chat).is_err() {
            tracing::info!("chat stream rejected: session is busy");
            return None;
        }
        state.load_generation = state.load_generation.wrapping_add(1);
        state.next_stream_id = state.next_stream_id.saturating_add(1);
        let stream_id = state.next_stream_id;
        let abort = AbortSignal::new();
        let assembler = MessageAssembler::start(Message::assistant_placeholder());
        self.publish_assistant(Some(assembler.message().clone()));
        state.history.push(Message::user(text));
        state.in_flight = Some(InFlight {
            stream_id,
            assembler,
            abort: abort.clone(),
        });

        Some(StartedStream {
            stream_id,
            abort,
            request: ChatStreamRequest::new(text).with_conversation_id(conversation_id),
        })
    }

    async fn drive(&self, stream_id: u64, mut frames: FrameStream) -> StreamOutcome {
        let mut terminal: Option<(TerminalReason, Option<String>)> = None;
        while let Some(event) = frames.next_event().await {
            match event {
                TransportEvent::Frame(frame) => {
                    let mut state = lock_or_recover(&self.state);
                    let SessionState {
                        history,
                        chat,
                        in_flight,
                        ..
                    } = &mut *state;
                    let Some(current) = in_flight
                        .as_mut()
                        .filter(|current| current.stream_id == stream_id)
                    else {
                        return StreamOutcome::Cancelled;
                    };
                    let outcome = current.assembler.apply_frame(&frame, chat);
                    if outcome != FrameOutcome::Ignored {
                        self.publish_assistant(Some(current.assembler.message().clone()));
                    }
                    if let FrameOutcome::Terminal(reason) = outcome {
                        terminal = Some((reason, chat.error.clone()));
                        if let Some(finished) = in_flight.take() {
                            history.push(finished.assembler.into_message());
                        }
                    }
                }
                TransportEvent::Error(error) => {
                    return if self.fail_in_flight(stream_id, &error) {
                        StreamOutcome::Failed(error.to_string())
                    } else {
                        StreamOutcome::Cancelled
                    };
                }
                TransportEvent::Complete => break,
            }
        }

        match terminal {
            Some((TerminalReason::Done, _)) => StreamOutcome::Completed,
            Some((TerminalReason::BackendError, error)) => {
                StreamOutcome::Failed(error.unwrap_or_default())
            }
            _ => StreamOutcome::Cancelled,
        }
    }

    fn fail_in_flight(&self, stream_id: u64, error: &TernClientError) -> bool {
        let mut state = lock_or_recover(&self.state);
        let SessionState {
            history,
            chat,
            in_flight,
            ..
        } = &mut *state;
        if !in_flight
            .as_ref()
            .is_some_and(|current| current.stream_id == stream_id)
        {
            return false;
        }
        let Some(mut current) = in_flight.take() else {
            return false;
        };
        current.assembler.fail_transport(error, chat);
        let message = current.assembler.into_message();
        self.publish_assistant(Some(message.clone()));
        history.push(message);
        true
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
