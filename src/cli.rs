//! Command line interface for Halberd.

pub mod args;
pub mod commands;
pub mod output;

use tracing_subscriber::EnvFilter;

pub use crate::cli::args::{CacheCommand, Command, HalberdArgs, OutputFormat};
pub use crate::cli::commands::execute_command;

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `-v`/`-q`.
pub fn init_logging(args: &HalberdArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("halberd={}", args.log_level())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
