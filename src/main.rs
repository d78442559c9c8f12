//! mtls-proxy: mutually authenticated TLS reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     MTLS PROXY                       │
//!                     │                                                      │
//!   Client (cert)     │  ┌──────────┐   ┌──────────────┐   ┌─────────────┐   │
//!   ──────────────────┼─▶│   net    │──▶│   security   │──▶│    http     │   │
//!                     │  │ acceptor │   │ chain + name │   │   server    │   │
//!                     │  └──────────┘   └──────────────┘   └──────┬──────┘   │
//!                     │                                           │          │
//!                     │                                           ▼          │
//!                     │                                    ┌─────────────┐   │
//!                     │                                    │   routing   │   │
//!                     │                                    │ host router │   │
//!                     │                                    └──────┬──────┘   │
//!                     │                                           │          │
//!   Response          │                                    ┌──────▼──────┐   │
//!   ◀─────────────────┼────────────────────────────────────│ http proxy  │◀──┼── Backend
//!                     │                                    └─────────────┘   │
//!                     │  config · lifecycle · observability (cross-cutting)  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use mtls_proxy::lifecycle::{signals, startup, Shutdown};
use mtls_proxy::net::listener;
use mtls_proxy::observability::logging;

/// Reverse proxy that only serves clients with a trusted certificate.
#[derive(Debug, Parser)]
#[command(name = "mtls-proxy", version, about)]
struct Cli {
    /// Configuration file (TOML, or JSON when the name ends in `.json`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    genconfig: bool,

    /// Validate configuration and TLS material, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = startup::load(cli.config.as_deref())?;

    if cli.genconfig {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mtls-proxy starting");

    let server = startup::prepare(&config)?;
    if cli.check {
        tracing::info!("Configuration OK");
        return Ok(());
    }

    startup::start_metrics(&config.observability)?;
    let listener = listener::bind(&config.listen)?;

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        res = &mut server_task => {
            res??;
            return Ok(());
        }
        signal = signals::wait_for_signal() => {
            let signal = signal?;
            tracing::info!(signal, "Shutdown signal received");
            shutdown.trigger();
        }
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
