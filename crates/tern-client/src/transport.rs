//! One-shot push connection that yields decoded frames.
//!
//! Each [`StreamTransport::open`] call issues exactly one `GET` request. The
//! returned [`FrameStream`] is pull-based: frames are decoded only as the
//! caller asks for the next event, so consumption is the sole suspension
//! point and frames arrive in wire order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tern_protocol::{ChatStreamRequest, Frame, FrameDecoder};
use tokio::sync::Notify;

use crate::TernClientError;

pub const DEFAULT_STREAM_PATH: &str = "/api/chat/stream";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3002";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;
/// Header carrying the opaque user identifier on every request.
pub const USER_ID_HEADER: &str = "x-tern-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `StreamTransportConfig` used across Tern components.
pub struct StreamTransportConfig {
    pub base_url: String,
    pub stream_path: String,
    pub connect_timeout_ms: u64,
    /// Longest gap allowed between two chunks before the stream fails.
    pub idle_timeout_ms: u64,
    pub user_id: Option<String>,
}

impl Default for StreamTransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            user_id: None,
        }
    }
}

/// Cancellation handle shared by a session and the stream it opened.
///
/// Aborting is idempotent; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as aborted and wakes waiters. Returns `true` only for the first call.
    pub fn abort(&self) -> bool {
        let already_aborted = self.aborted.swap(true, Ordering::SeqCst);
        if !already_aborted {
            self.notify.notify_waiters();
        }
        !already_aborted
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once [`AbortSignal::abort`] has been called.
    pub async fn aborted(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }
}

#[derive(Debug)]
/// Enumerates supported `TransportEvent` values.
pub enum TransportEvent {
    Frame(Frame),
    Error(TernClientError),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameStreamState {
    Open,
    TerminalDelivered,
    Finished,
}

/// Decoded frame sequence for one request.
///
/// Yields at most one of `Complete` (after a terminal frame) or `Error`, then
/// `None`. Once the abort signal fires it yields `None` and never `Complete`.
pub struct FrameStream {
    body: BoxStream<'static, Result<Vec<u8>, TernClientError>>,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    idle_timeout: Duration,
    abort: AbortSignal,
    state: FrameStreamState,
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("pending", &self.pending.len())
            .field("idle_timeout", &self.idle_timeout)
            .field("state", &self.state)
            .finish()
    }
}

impl FrameStream {
    /// Wraps any chunked byte source, e.g. an HTTP body or an in-process channel.
    pub fn from_byte_stream<S, B, E>(body: S, idle_timeout: Duration, abort: AbortSignal) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]>,
        E: Into<TernClientError>,
    {
        let body = body
            .map(|chunk| chunk.map(|bytes| bytes.as_ref().to_vec()).map_err(Into::into))
            .boxed();
        Self {
            body,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            idle_timeout,
            abort,
            state: FrameStreamState::Open,
        }
    }

    fn aborted(abort: AbortSignal) -> Self {
        let mut frames = Self::from_byte_stream(
            stream::empty::<Result<Vec<u8>, TernClientError>>(),
            Duration::ZERO,
            abort,
        );
        frames.state = FrameStreamState::Finished;
        frames
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if self.abort.is_aborted() {
                self.finish();
                return None;
            }
            match self.state {
                FrameStreamState::Finished => return None,
                FrameStreamState::TerminalDelivered => {
                    self.finish();
                    return Some(TransportEvent::Complete);
                }
                FrameStreamState::Open => {}
            }

            if let Some(frame) = self.pending.pop_front() {
                if frame.is_terminal() {
                    self.state = FrameStreamState::TerminalDelivered;
                    self.pending.clear();
                }
                return Some(TransportEvent::Frame(frame));
            }

            let next = tokio::select! {
                biased;
                _ = self.abort.aborted() => None,
                next = tokio::time::timeout(self.idle_timeout, self.body.next()) => Some(next),
            };
            let Some(next) = next else {
                self.finish();
                return None;
            };

            match next {
                Ok(Some(Ok(chunk))) => {
                    let frames = self.decoder.push(&chunk);
                    self.pending.extend(frames);
                }
                Ok(Some(Err(error))) => return Some(self.fail(error)),
                Ok(None) => {
                    let error = if self.decoder.has_partial_frame() {
                        TernClientError::IncompleteFrame
                    } else {
                        TernClientError::StreamEndedWithoutTerminal
                    };
                    return Some(self.fail(error));
                }
                Err(_) => {
                    let idle_ms = u64::try_from(self.idle_timeout.as_millis()).unwrap_or(u64::MAX);
                    return Some(self.fail(TernClientError::IdleTimeout { idle_ms }));
                }
            }
        }
    }

    fn fail(&mut self, error: TernClientError) -> TransportEvent {
        tracing::warn!(error = %error, "chat stream failed");
        self.finish();
        TransportEvent::Error(error)
    }

    fn finish(&mut self) {
        self.state = FrameStreamState::Finished;
        self.pending.clear();
    }
}

#[derive(Debug, Clone)]
/// Public struct `StreamTransport` used across Tern components.
pub struct StreamTransport {
    client: reqwest::Client,
    config: StreamTransportConfig,
}

impl StreamTransport {
    pub fn new(config: StreamTransportConfig) -> Result<Self, TernClientError> {
        if config.base_url.trim().is_empty() {
            return Err(TernClientError::InvalidConfig(
                "base_url must be non-empty".to_string(),
            ));
        }
        if config.idle_timeout_ms == 0 {
            return Err(TernClientError::InvalidConfig(
                "idle_timeout_ms must be greater than 0".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StreamTransportConfig {
        &self.config
    }

    fn stream_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = self.config.stream_path.trim();
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Opens the push connection for `request`.
    ///
    /// Response headers must arrive within the idle timeout. An abort that
    /// fires while connecting yields a stream that is already finished.
    pub async fn open(
        &self,
        request: &ChatStreamRequest,
        abort: AbortSignal,
    ) -> Result<FrameStream, TernClientError> {
        let mut builder = self
            .client
            .get(self.stream_url())
            .query(&request.query_pairs())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(user_id) = self.config.user_id.as_deref() {
            builder = builder.header(USER_ID_HEADER, user_id);
        }

        tracing::debug!(
            conversation_id = request.conversation_id.as_deref().unwrap_or(""),
            "opening chat stream"
        );
        let idle_timeout = Duration::from_millis(self.config.idle_timeout_ms);
        let response = tokio::select! {
            biased;
            _ = abort.aborted() => None,
            response = tokio::time::timeout(idle_timeout, builder.send()) => Some(response),
        };
        let Some(response) = response else {
            return Ok(FrameStream::aborted(abort));
        };
        let Ok(response) = response else {
            tracing::warn!(
                idle_ms = self.config.idle_timeout_ms,
                "chat stream response headers never arrived"
            );
            return Err(TernClientError::IdleTimeout {
                idle_ms: self.config.idle_timeout_ms,
            });
        };
        let response = response?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TernClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(FrameStream::from_byte_stream(
            response.bytes_stream(),
            Duration::from_millis(self.config.idle_timeout_ms),
            abort,
        ))
    }
}
