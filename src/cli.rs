use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediator", version)]
#[command(about = "Media gateway: image transforms, proxying and document rendering", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP gateway
    Server(ServerArgs),
    /// Print a URL with a valid signature appended
    Sign(SignArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind to, overrides `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file, overrides `MEDIATOR_CONFIG`
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SignArgs {
    /// Signing secret, defaults to `MEDIATOR_SECRET_KEY`
    #[arg(long)]
    pub secret: Option<String>,

    /// Full URL as clients will request it, e.g. https://media.example.com/image/transform/cdn/a.jpg?w=200
    pub url: String,
}
