//! # nounwire - Noun Graph Server
//!
//! The main binary for the nounwire graph marshalling service.
//!
//! This application provides:
//! - HTTP server (axum-based `schema` and `query` endpoints)
//! - Remote client commands (reqwest-based)
//! - Offline marshalling of local datasets
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    apps/nounwire (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐    │
//! │  │   CLI       │    │   HTTP API  │    │  Remote client   │    │
//! │  │  (clap)     │    │   (axum)    │    │   (reqwest)      │    │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘    │
//! │         │                  │                    │              │
//! │         └──────────────────┼────────────────────┘              │
//! │                            ▼                                   │
//! │                    ┌───────────────┐                           │
//! │                    │ nounwire-core │                           │
//! │                    │ (THE LOGIC)   │                           │
//! │                    └───────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server over the sample mail dataset
//! nounwire server --port 8778
//!
//! # Talk to a running server
//! nounwire schema
//! nounwire query -n message -c '[["read", [false]], ["limit", [10]]]'
//!
//! # Marshal a local dataset without a server
//! nounwire marshal -n conversation -i 100
//! ```

use clap::Parser;
use nounwire::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // NOUNWIRE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("NOUNWIRE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nounwire=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner to stderr so command output stays clean JSON.
fn print_banner() {
    eprintln!(
        r#"
  ┌┐┌┌─┐┬ ┬┌┐┌┬ ┬┬┬─┐┌─┐
  ││││ ││ ││││││││├┬┘├┤
  ┘└┘└─┘└─┘┘└┘└┴┘┴┴└─└─┘

  Noun graph marshalling v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
