use mediator::config::Config;
use mediator::signature::SignatureVerifier;
use tracing::info;

use crate::cli::{ServerArgs, SignArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(args: ServerArgs) -> Result<(), AnyError> {
    info!("Loading configuration");
    let mut config =
        Config::load_with(args.config).map_err(|e| format!("Failed to load config: {}", e))?;

    if let Some(address) = args.address {
        config.server.bind_addr = address;
    }

    mediator::api::run(config).await
}

pub fn sign(args: SignArgs) -> Result<(), AnyError> {
    let secret = args
        .secret
        .or_else(|| std::env::var("MEDIATOR_SECRET_KEY").ok())
        .filter(|secret| !secret.is_empty())
        .ok_or("no signing secret: pass --secret or set MEDIATOR_SECRET_KEY")?;

    println!("{}", SignatureVerifier::new(secret).sign_url(&args.url));
    Ok(())
}
