//! Named server-push frame codec.
//!
//! Encoding is `event: <type>\n`, one `data: <line>\n` per payload line, and a
//! terminating blank line. Decoding is incremental: [`FrameDecoder::push`]
//! accepts arbitrary byte chunks and only ever yields complete frames.

use thiserror::Error;

use crate::event::StreamEventKind;

/// Event name assigned to frames that carry data but no `event:` line.
pub const DEFAULT_EVENT_NAME: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
/// One protocol unit: a named event with its raw text payload.
pub struct Frame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Reasons a frame cannot be put on the wire.
pub enum FrameEncodeError {
    #[error("frame event name must be non-empty")]
    EmptyEventName,
    #[error("frame event name '{0}' must be a single line")]
    MultiLineEventName(String),
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn from_kind(kind: &StreamEventKind, data: impl Into<String>) -> Self {
        Self::new(kind.as_str(), data)
    }

    pub fn kind(&self) -> StreamEventKind {
        StreamEventKind::parse(&self.event)
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    pub fn encode(&self) -> Result<String, FrameEncodeError> {
        encode_frame(&self.event, &self.data)
    }
}

/// Encodes `(event, payload)` as a complete wire frame.
///
/// Multi-line payloads are split into one `data:` line each so an embedded
/// blank line can never terminate the frame early.
pub fn encode_frame(event: &str, payload: &str) -> Result<String, FrameEncodeError> {
    let event = event.trim();
    if event.is_empty() {
        return Err(FrameEncodeError::EmptyEventName);
    }
    if event.contains('\n') || event.contains('\r') {
        return Err(FrameEncodeError::MultiLineEventName(event.to_string()));
    }

    let normalized = payload.replace("\r\n", "\n");
    let mut encoded = String::with_capacity(event.len() + normalized.len() + 16);
    encoded.push_str("event: ");
    encoded.push_str(event);
    encoded.push('\n');
    for line in normalized.split('\n') {
        encoded.push_str("data: ");
        encoded.push_str(line);
        encoded.push('\n');
    }
    encoded.push('\n');
    Ok(encoded)
}

#[derive(Debug, Default)]
/// Incremental frame decoder fed by raw transport chunks.
pub struct FrameDecoder {
    line_buffer: String,
    utf8_carry: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let text = self.decode_utf8(chunk);
        self.line_buffer.push_str(&text);

        let mut frames = Vec::new();
        while let Some(pos) = self.line_buffer.find('\n') {
            let mut line = self.line_buffer.drain(..=pos).collect::<String>();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(frame) = self.apply_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// True when input has been buffered that did not yet complete a frame.
    pub fn has_partial_frame(&self) -> bool {
        !self.line_buffer.is_empty()
            || !self.utf8_carry.is_empty()
            || self.event.is_some()
            || !self.data_lines.is_empty()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.utf8_carry.extend_from_slice(chunk);
        match std::str::from_utf8(&self.utf8_carry) {
            Ok(text) => {
                let text = text.to_string();
                self.utf8_carry.clear();
                text
            }
            Err(error) if error.error_len().is_none() => {
                // Trailing bytes are the start of a multi-byte sequence split by the chunk.
                let valid = error.valid_up_to();
                let text = String::from_utf8_lossy(&self.utf8_carry[..valid]).into_owned();
                self.utf8_carry.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.utf8_carry).into_owned();
                self.utf8_carry.clear();
                text
            }
        }
    }

    fn apply_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let event = self.event.take();
        if event.is_none() && self.data_lines.is_empty() {
            return None;
        }
        let event = event
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(Frame { event, data })
    }
}
