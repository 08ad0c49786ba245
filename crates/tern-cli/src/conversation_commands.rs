use anyhow::{Context, Result};
use tern_client::{ConversationApiClient, ConversationApiConfig};
use tern_protocol::ConversationPatch;

use crate::bootstrap_helpers::resolve_user_id;
use crate::cli_args::{ConversationAction, ConversationsArgs};

pub(crate) async fn run_conversations_command(args: ConversationsArgs) -> Result<()> {
    let client = ConversationApiClient::new(ConversationApiConfig {
        base_url: args.client.base_url.clone(),
        request_timeout_ms: args.client.connect_timeout_ms,
        user_id: Some(resolve_user_id(&args.client)?),
    })
    .context("invalid conversation api configuration")?;

    let rendered = match args.action {
        ConversationAction::List => {
            serde_json::to_string_pretty(&client.list_conversations().await?)?
        }
        ConversationAction::Create { title } => {
            serde_json::to_string_pretty(&client.create_conversation(title.as_deref()).await?)?
        }
        ConversationAction::Rename { id, title } => {
            let patch = ConversationPatch {
                title: Some(title),
                ..ConversationPatch::default()
            };
            serde_json::to_string_pretty(&client.update_conversation(&id, &patch).await?)?
        }
        ConversationAction::Delete { id } => {
            client.delete_conversation(&id).await?;
            format!("deleted conversation {id}")
        }
        ConversationAction::Messages { id } => {
            serde_json::to_string_pretty(&client.conversation_messages(&id).await?)?
        }
    };
    println!("{rendered}");
    Ok(())
}
