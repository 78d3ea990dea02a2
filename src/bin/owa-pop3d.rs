#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! POP3 proxy daemon for Outlook Web Access
//!
//! Point a POP3 client at this process and it will serve an OWA
//! account's inbox, deleting each message from the backend once it
//! has been retrieved. Run with `--once` as a mail-check precommand:
//! the server exits after the first completed session.

use clap::Parser;
use owa_pop3_proxy::{ProxyConfig, Pop3Server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "owa-pop3d")]
#[command(about = "POP3 proxy daemon for Outlook Web Access webmail")]
struct Args {
    /// Serve one POP3 session, then exit
    #[arg(long)]
    once: bool,

    /// Listen address (overrides POP3_LISTEN_HOST)
    #[arg(long)]
    listen: Option<String>,

    /// Listen port (overrides POP3_LISTEN_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = ProxyConfig::from_env()?;
    config.serve_once = args.once;
    if let Some(listen) = args.listen {
        config.listen_host = listen;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    let server = Pop3Server::bind(config).await?;
    server.run().await?;

    Ok(())
}
