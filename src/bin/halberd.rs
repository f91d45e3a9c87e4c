//! Halberd CLI binary.

use anyhow::Context;
use clap::Parser;
use halberd::cli::{HalberdArgs, execute_command, init_logging};

fn main() -> anyhow::Result<()> {
    let args = HalberdArgs::parse();
    init_logging(&args);
    execute_command(args).context("halberd command failed")
}
