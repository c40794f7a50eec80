mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    mediator::observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => server::run(args).await?,
        Commands::Sign(args) => server::sign(args)?,
    }

    Ok(())
}
