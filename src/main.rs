mod cli;
mod execute;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use crate::cli::CLI;

fn main() {
    let cli = CLI::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    if let Err(err) = execute::execute(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
