//! `delivery`: incremental configuration delivery

mod cli;
mod error;
mod lock;
mod runner;

use clap::Parser;
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::Cli;
use error::{CliError, Result};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("{}: {}", "error".red().bold(), e);
    }

    match execute(&cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Run one pass and return the process exit code.
fn execute(cli: &Cli) -> Result<i32> {
    let config = runner::load_config(cli)?;
    let result = runner::run(&config)?;
    if result.is_success() {
        return Ok(0);
    }
    eprintln!("{}: {}", "error".red().bold(), result.message);
    // An unresolvable checkpoint needs an operator, not a retry
    Ok(if result.is_unknown_revision() { 2 } else { 1 })
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(cli.verbose > 1)
        .with_writer(std::io::stderr);

    let installed = if cli.timestamp {
        tracing::subscriber::set_global_default(builder.finish())
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())
    };
    installed.map_err(|e| CliError::user(format!("Failed to set up logging: {e}")))?;
    tracing::debug!("Logging at {}", level);
    Ok(())
}
