mod bootstrap_helpers;
mod chat_command;
mod cli_args;
mod conversation_commands;

use anyhow::Result;
use clap::Parser;
use tern_gateway::{run_gateway_server, EmitterConfig, GatewayServerConfig};

use crate::bootstrap_helpers::init_tracing;
use crate::chat_command::run_chat_command;
use crate::cli_args::{Cli, CliCommand, ServeArgs};
use crate::conversation_commands::run_conversations_command;

fn gateway_config_from_args(args: ServeArgs) -> GatewayServerConfig {
    GatewayServerConfig {
        bind: args.bind,
        state_dir: args.state_dir,
        emitter: EmitterConfig {
            first_frame_delay_ms: args.first_frame_delay_ms,
            frame_interval_ms: args.frame_interval_ms,
            include_reasoning: args.emit_reasoning,
            keep_alive_interval_ms: args.keep_alive_ms,
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Serve(args) => run_gateway_server(gateway_config_from_args(args)).await,
        CliCommand::Chat(args) => run_chat_command(args).await,
        CliCommand::Conversations(args) => run_conversations_command(args).await,
    }
}
