//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Delivers configuration from a git checkout to a configuration server,
/// uploading only what changed since the last delivered revision.
#[derive(Parser, Debug)]
#[command(name = "delivery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Dryrun mode: log what would change, change nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Verbosity level. Twice for debug.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Timestamp output
    #[arg(short = 'T', long)]
    pub timestamp: bool,

    /// Config file (must exist when given)
    #[arg(short = 'c', long, env = "DELIVERY_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Lock file, overriding the config
    #[arg(short, long)]
    pub lockfile: Option<PathBuf>,

    /// Pid file, overriding the config
    #[arg(short, long)]
    pub pidfile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_no_args() {
        let cli = Cli::parse_from(["delivery"]);
        assert!(!cli.dry_run);
        assert_eq!(cli.verbose, 0);
        assert!(cli.lockfile.is_none());
    }

    #[test]
    fn parse_short_flags() {
        let cli = Cli::parse_from([
            "delivery", "-n", "-vv", "-T", "-c", "/tmp/d.toml", "-l", "/tmp/lock", "-p",
            "/tmp/pid",
        ]);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
        assert!(cli.timestamp);
        assert_eq!(cli.config_file, Some(PathBuf::from("/tmp/d.toml")));
        assert_eq!(cli.lockfile, Some(PathBuf::from("/tmp/lock")));
        assert_eq!(cli.pidfile, Some(PathBuf::from("/tmp/pid")));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["delivery", "--bogus"]).is_err());
    }
}
