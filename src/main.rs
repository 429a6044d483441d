//! `tflow`: memoized multi-phase LM translation.
mod cli;
mod config;
mod extract;
mod lm;
mod phase;
mod pipeline;
mod prompts;
mod workflow;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TFLOW_LOG";

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        cli::Command::Translate(args) => workflow::run_translate(&args),
        cli::Command::Session(args) => workflow::run_session(&args),
        cli::Command::Align(args) => workflow::run_align(&args),
        cli::Command::Config(args) => run_config(&args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_config(args: &cli::ConfigArgs) -> Result<()> {
    if args.path {
        let path = config::default_config_path()
            .ok_or_else(|| anyhow!("cannot determine config directory"))?;
        println!("{}", path.display());
        return Ok(());
    }
    println!("{}", config::config_stub()?);
    Ok(())
}
