use anyhow::{Context, Result};
use tern_client::{AnonymousIdentityProvider, IdentityProvider};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::cli_args::ClientArgs;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Resolves the opaque user id sent with every gateway request.
pub(crate) fn resolve_user_id(args: &ClientArgs) -> Result<String> {
    let provider = match args.identity_path.as_deref() {
        Some(path) => AnonymousIdentityProvider::persistent(path),
        None => AnonymousIdentityProvider::ephemeral(),
    };
    let identity = provider
        .identity()
        .context("failed to resolve anonymous identity")?;
    tracing::debug!(user_id = %identity.id, name = %identity.name, "resolved identity");
    Ok(identity.id)
}
