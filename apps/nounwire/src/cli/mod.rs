//! # nounwire CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server over a dataset
//! - `schema` - Fetch the query schemas of a running server
//! - `query` - Run a query against a running server
//! - `marshal` - Run a query against a local dataset and print the wire form
//! - `describe` - Print wire schemas and query capabilities of the mail model

mod commands;

use clap::{Parser, Subcommand};
use nounwire_core::NounwireError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// nounwire - noun graph marshalling
///
/// Serves typed object graphs as flat, deduplicated JSON and rebuilds them
/// on the client side.
#[derive(Parser, Debug)]
#[command(name = "nounwire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// JSON dataset to serve (default: built-in sample mailbox)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Requests per second, 0 disables rate limiting
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Query timeout in milliseconds
        #[arg(long)]
        query_timeout_ms: Option<u64>,
    },

    /// Fetch query schemas from a server
    Schema {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Run a query against a server
    Query {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Noun to query (contact, identity, conversation, message)
        #[arg(short, long)]
        noun: String,

        /// Constraints as JSON: '[["method", [args...]], ...]'
        #[arg(short, long, default_value = "[]")]
        constraints: String,

        /// Print the rebuilt object graph instead of the wire form
        #[arg(long)]
        rebuild: bool,
    },

    /// Run a query against a local dataset and print the marshalled set
    Marshal {
        /// JSON dataset (default: built-in sample mailbox)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Noun to query
        #[arg(short, long)]
        noun: String,

        /// Constraints as JSON: '[["method", [args...]], ...]'
        #[arg(short, long, default_value = "[]")]
        constraints: String,

        /// Print the rebuilt object graph instead of the wire form
        #[arg(long)]
        rebuild: bool,
    },

    /// Print wire schemas and query capabilities
    Describe {
        /// Only this noun
        #[arg(short, long)]
        noun: Option<String>,
    },
}

/// Where and how to reach a server.
#[derive(clap::Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Server base URL
    #[arg(short, long, default_value = "http://localhost:8778")]
    pub url: String,

    /// Auth key (default: from configuration or ~/.nounwire-authkey)
    #[arg(short, long)]
    pub authkey: Option<String>,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), NounwireError> {
    let config = cli.config.as_deref();

    match cli.command {
        Some(Commands::Server {
            host,
            port,
            dataset,
            rate_limit,
            query_timeout_ms,
        }) => {
            let overrides = ServerOverrides {
                host,
                port,
                dataset,
                rate_limit,
                query_timeout_ms,
            };
            cmd_server(config, overrides).await
        }
        Some(Commands::Schema { remote }) => cmd_schema(config, &remote).await,
        Some(Commands::Query {
            remote,
            noun,
            constraints,
            rebuild,
        }) => cmd_query(config, &remote, &noun, &constraints, rebuild).await,
        Some(Commands::Marshal {
            dataset,
            noun,
            constraints,
            rebuild,
        }) => cmd_marshal(dataset.as_deref(), &noun, &constraints, rebuild),
        Some(Commands::Describe { noun }) => cmd_describe(noun.as_deref()),
        None => cmd_server(config, ServerOverrides::default()).await,
    }
}
