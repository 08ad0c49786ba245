use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tern_client::{DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_MS};
use tern_gateway::{
    DEFAULT_FIRST_FRAME_DELAY_MS, DEFAULT_FRAME_INTERVAL_MS, DEFAULT_GATEWAY_BIND,
    DEFAULT_KEEP_ALIVE_INTERVAL_MS,
};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "tern",
    about = "Streaming chat gateway and client over server-sent events",
    version
)]
/// Public struct `Cli` used across Tern components.
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the gateway with the reference emitter and conversation routes.
    Serve(ServeArgs),
    /// Send one message and print the reply as it streams in.
    Chat(ChatArgs),
    /// Manage stored conversations on a running gateway.
    Conversations(ConversationsArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(
        long,
        env = "TERN_BIND",
        default_value = DEFAULT_GATEWAY_BIND,
        help = "Socket address the gateway listens on."
    )]
    pub bind: String,

    #[arg(
        long = "state-dir",
        env = "TERN_STATE_DIR",
        help = "Directory for the conversation snapshot. Conversations stay in memory when unset."
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(
        long = "first-frame-delay-ms",
        env = "TERN_FIRST_FRAME_DELAY_MS",
        default_value_t = DEFAULT_FIRST_FRAME_DELAY_MS,
        help = "Delay before the emitter sends its first frame."
    )]
    pub first_frame_delay_ms: u64,

    #[arg(
        long = "frame-interval-ms",
        env = "TERN_FRAME_INTERVAL_MS",
        default_value_t = DEFAULT_FRAME_INTERVAL_MS,
        value_parser = parse_positive_u64,
        help = "Gap between consecutive emitter frames."
    )]
    pub frame_interval_ms: u64,

    #[arg(
        long = "keep-alive-ms",
        env = "TERN_KEEP_ALIVE_MS",
        default_value_t = DEFAULT_KEEP_ALIVE_INTERVAL_MS,
        value_parser = parse_positive_u64,
        help = "Longest silence on a chat stream before a keep-alive comment is sent."
    )]
    pub keep_alive_ms: u64,

    #[arg(
        long = "emit-reasoning",
        env = "TERN_EMIT_REASONING",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Prefix replies with thinking, tool_call, and tool_result frames."
    )]
    pub emit_reasoning: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
    #[arg(
        long = "base-url",
        env = "TERN_BASE_URL",
        default_value = DEFAULT_BASE_URL,
        help = "Gateway base URL."
    )]
    pub base_url: String,

    #[arg(
        long = "connect-timeout-ms",
        env = "TERN_CONNECT_TIMEOUT_MS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Connect timeout for gateway requests."
    )]
    pub connect_timeout_ms: u64,

    #[arg(
        long = "identity-path",
        env = "TERN_IDENTITY_PATH",
        help = "File holding the anonymous identity. A fresh identity is minted per run when unset."
    )]
    pub identity_path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    #[arg(long, short = 'm', help = "Message text to send.")]
    pub message: String,

    #[arg(
        long = "conversation-id",
        help = "Conversation that records the exchange."
    )]
    pub conversation_id: Option<String>,

    #[arg(
        long = "idle-timeout-ms",
        env = "TERN_IDLE_TIMEOUT_MS",
        default_value_t = DEFAULT_IDLE_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Fail the stream when no frame arrives within this window."
    )]
    pub idle_timeout_ms: u64,

    #[arg(
        long = "show-thinking",
        default_value_t = false,
        help = "Print thinking and tool frames to stderr as they arrive."
    )]
    pub show_thinking: bool,
}

#[derive(Debug, Args)]
pub struct ConversationsArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    #[command(subcommand)]
    pub action: ConversationAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConversationAction {
    /// List conversations, most recently updated first.
    List,
    /// Create a conversation.
    Create {
        #[arg(long)]
        title: Option<String>,
    },
    /// Rename a conversation.
    Rename {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
    },
    /// Delete a conversation.
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Print the stored messages of a conversation.
    Messages {
        #[arg(long)]
        id: String,
    },
}
