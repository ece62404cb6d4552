use std::env;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use launcher::cli::Cli;
use launcher::launch;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let program = env::current_exe()
        .ok()
        .or_else(|| env::args_os().next().map(PathBuf::from))
        .unwrap_or_default();

    launch::run(cli, program).context("could not launch the application")
}
