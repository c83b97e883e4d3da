//! TagMend - audio metadata repair from the command line.
//!
//! Reconciles what a file's embedded tags, its file name, and the
//! MusicBrainz database each claim about a track into one scored
//! record, and optionally writes the result back with a backup-first
//! transactional writer.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod lookup;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod reconcile;
pub mod writer;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("tagmend=info".parse()?))
        .init();

    cli::run_command(&args)
}
