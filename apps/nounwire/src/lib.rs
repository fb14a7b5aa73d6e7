//! # nounwire
//!
//! Server, client and command line around `nounwire-core`.
//!
//! - [`api`]: axum router exposing `schema` and `query` over a `NounProvider`
//! - [`client`]: reqwest client that rebuilds object graphs locally
//! - [`config`]: `ServerConfig` from TOML, environment and flags
//! - [`fixture`]: in-memory provider over a `NounStore`
//! - [`cli`]: clap commands

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod fixture;
