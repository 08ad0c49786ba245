//! Deterministic frame script for the reference chat-stream emitter.
//!
//! A script is built once per request and validated up front: offsets are
//! strictly increasing, every frame is already wire-encoded, and exactly one
//! `done` frame closes the sequence.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tern_protocol::{ContentPayload, Frame, StreamEventKind};

pub const DEFAULT_FIRST_FRAME_DELAY_MS: u64 = 100;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 200;
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 15_000;
/// Comment frame sent while the script is idle; decoders skip it.
pub const KEEP_ALIVE_COMMENT: &str = ": keep-alive\n\n";

const SIMULATED_REPLY_SECOND: &str = "This is a simulated streaming response";
const SIMULATED_REPLY_THIRD: &str = " and the emitter is working";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `EmitterConfig` used across Tern components.
pub struct EmitterConfig {
    pub first_frame_delay_ms: u64,
    pub frame_interval_ms: u64,
    /// Emit `thinking`, `tool_call` and `tool_result` frames before the reply.
    pub include_reasoning: bool,
    /// Longest silence before a keep-alive comment is written.
    pub keep_alive_interval_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            first_frame_delay_ms: DEFAULT_FIRST_FRAME_DELAY_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            include_reasoning: false,
            keep_alive_interval_ms: DEFAULT_KEEP_ALIVE_INTERVAL_MS,
        }
    }
}

impl EmitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_interval_ms == 0 {
            bail!("emitter frame interval must be greater than 0");
        }
        if self.keep_alive_interval_ms == 0 {
            bail!("emitter keep-alive interval must be greater than 0");
        }
        Ok(())
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A frame with its emission offset from the start of the response.
pub struct ScriptedFrame {
    pub offset_ms: u64,
    pub frame: Frame,
    pub encoded: String,
}

impl ScriptedFrame {
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `EmitterScript` used across Tern components.
pub struct EmitterScript {
    frames: Vec<ScriptedFrame>,
    assistant_text: String,
}

impl EmitterScript {
    /// Builds the reply script for one inbound `message`.
    pub fn for_request(message: &str, config: &EmitterConfig) -> Result<Self> {
        config.validate()?;

        let mut plan: Vec<(StreamEventKind, String)> = Vec::new();
        if config.include_reasoning {
            plan.push((
                StreamEventKind::Thinking,
                format!("Reading a {}-character message", message.chars().count()),
            ));
            plan.push((
                StreamEventKind::ToolCall,
                json!({ "name": "echo", "input": message }).to_string(),
            ));
            plan.push((
                StreamEventKind::ToolResult,
                json!({ "name": "echo", "output": message }).to_string(),
            ));
        }
        for text in [
            format!("Hello! I received: \"{message}\""),
            SIMULATED_REPLY_SECOND.to_string(),
            SIMULATED_REPLY_THIRD.to_string(),
        ] {
            plan.push((
                StreamEventKind::Content,
                json!({ "content": text }).to_string(),
            ));
        }
        plan.push((StreamEventKind::Done, String::new()));

        let frames = plan
            .into_iter()
            .zip(0_u64..)
            .map(|((kind, data), index)| {
                let offset_ms = config
                    .first_frame_delay_ms
                    .saturating_add(config.frame_interval_ms.saturating_mul(index));
                (offset_ms, Frame::from_kind(&kind, data))
            })
            .collect::<Vec<_>>();
        Self::from_frames(frames)
    }

    /// Validates and encodes an explicit `(offset_ms, frame)` sequence.
    pub fn from_frames(frames: Vec<(u64, Frame)>) -> Result<Self> {
        let Some((_, last)) = frames.last() else {
            bail!("emitter script must contain at least the done frame");
        };
        if last.kind() != StreamEventKind::Done {
            bail!("emitter script must end with a done frame");
        }

        let last_index = frames.len() - 1;
        let mut scripted = Vec::with_capacity(frames.len());
        let mut assistant_text = String::new();
        let mut previous_offset: Option<u64> = None;
        for (index, (offset_ms, frame)) in frames.into_iter().enumerate() {
            if previous_offset.is_some_and(|previous| offset_ms <= previous) {
                bail!("emitter frame {index} offset {offset_ms}ms does not increase");
            }
            previous_offset = Some(offset_ms);

            match frame.kind() {
                StreamEventKind::Done if index != last_index => {
                    bail!("emitter frame {index} is a done frame before the end of the script");
                }
                StreamEventKind::Error => {
                    bail!("emitter frame {index} is an error frame; scripts end only in done");
                }
                StreamEventKind::Content => {
                    assistant_text.push_str(ContentPayload::decode(&frame.data).text());
                }
                _ => {}
            }

            let encoded = frame
                .encode()
                .with_context(|| format!("failed to encode emitter frame {index}"))?;
            scripted.push(ScriptedFrame {
                offset_ms,
                frame,
                encoded,
            });
        }

        Ok(Self {
            frames: scripted,
            assistant_text,
        })
    }

    pub fn frames(&self) -> &[ScriptedFrame] {
        &self.frames
    }

    /// Concatenated text of every `content` frame; recorded as the assistant message.
    pub fn assistant_text(&self) -> &str {
        &self.assistant_text
    }
}

#[cfg(test)]
mod tests {
    use tern_protocol::{Frame, FrameDecoder, StreamEventKind};

    use super::{EmitterConfig, EmitterScript};

    #[test]
    fn functional_default_script_matches_reference_timing() {
        let script =
            EmitterScript::for_request("ping", &EmitterConfig::default()).expect("script");
        let plan = script
            .frames()
            .iter()
            .map(|scripted| (scripted.offset_ms, scripted.frame.event.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            plan,
            vec![
                (100, "content"),
                (300, "content"),
                (500, "content"),
                (700, "done"),
            ]
        );
        assert_eq!(
            script.assistant_text(),
            "Hello! I received: \"ping\"This is a simulated streaming response and the emitter is working"
        );
        assert_eq!(script.frames()[3].encoded, "event: done\ndata: \n\n");
    }

    #[test]
    fn functional_reasoning_frames_precede_content() {
        let config = EmitterConfig {
            include_reasoning: true,
            ..EmitterConfig::default()
        };
        let script = EmitterScript::for_request("2+2", &config).expect("script");
        let kinds = script
            .frames()
            .iter()
            .map(|scripted| scripted.frame.kind())
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::Thinking,
                StreamEventKind::ToolCall,
                StreamEventKind::ToolResult,
                StreamEventKind::Content,
                StreamEventKind::Content,
                StreamEventKind::Content,
                StreamEventKind::Done,
            ]
        );
        assert!(!script.assistant_text().contains("echo"));
    }

    #[test]
    fn unit_encoded_script_decodes_back_to_frames() {
        let script = EmitterScript::for_request("multi\nline", &EmitterConfig::default())
            .expect("script");
        let wire = script
            .frames()
            .iter()
            .map(|scripted| scripted.encoded.as_str())
            .collect::<String>();
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(wire.as_bytes());
        assert_eq!(frames.len(), script.frames().len());
        assert_eq!(frames.last(), Some(&Frame::new("done", "")));
    }

    #[test]
    fn regression_script_rejects_non_increasing_offsets() {
        let error = EmitterScript::from_frames(vec![
            (100, Frame::new("content", "a")),
            (100, Frame::new("content", "b")),
            (200, Frame::new("done", "")),
        ])
        .expect_err("equal offsets");
        assert!(error.to_string().contains("does not increase"));
    }

    #[test]
    fn regression_script_requires_single_trailing_done() {
        assert!(EmitterScript::from_frames(vec![(1, Frame::new("content", "a"))]).is_err());
        assert!(EmitterScript::from_frames(vec![
            (1, Frame::new("done", "")),
            (2, Frame::new("done", "")),
        ])
        .is_err());
        assert!(EmitterScript::from_frames(Vec::new()).is_err());
    }

    #[test]
    fn unit_zero_interval_is_rejected() {
        let config = EmitterConfig {
            frame_interval_ms: 0,
            ..EmitterConfig::default()
        };
        assert!(EmitterScript::for_request("x", &config).is_err());
    }

    #[test]
    fn regression_zero_keep_alive_interval_is_rejected() {
        let config = EmitterConfig {
            keep_alive_interval_ms: 0,
            ..EmitterConfig::default()
        };
        assert!(config
            .validate()
            .expect_err("zero keep-alive")
            .to_string()
            .contains("keep-alive"));
    }
}
