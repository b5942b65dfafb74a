//! Clap definitions shared by the `shuttle` client and the `shuttled` daemon

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// Daemon options. Unset values fall back to the config file, then to defaults.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "shuttled - single-file transfer daemon")]
pub struct DaemonOpts {
    /// Bind address (host:port) [default: 0.0.0.0:9032]
    #[arg(long)]
    pub bind: Option<String>,

    /// Listen on all interfaces at this port
    #[arg(short, long, conflicts_with = "bind")]
    pub port: Option<u16>,

    /// Directory files are stored in and served from [default: .]
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Append daemon events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Write one JSONL record per finished transfer
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pretend the root volume has exactly this many free bytes
    #[arg(long = "free-space", value_name = "BYTES")]
    pub free_space: Option<u64>,

    /// Don't log events to stderr
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Upload a local file
    Put,
    /// Download a file into the destination directory
    Get,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Put => f.write_str("PUT"),
            Action::Get => f.write_str("GET"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "shuttle - send or fetch one file")]
pub struct ClientOpts {
    /// Server address (host:port or shuttle://host:port)
    pub server: String,

    /// put or get
    #[arg(value_enum, ignore_case = true)]
    pub action: Action,

    /// Local file for put, remote file name for get
    pub file: PathBuf,

    /// Directory to write into for get
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Show a transfer progress bar
    #[arg(short, long)]
    pub progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_commands_are_well_formed() {
        DaemonOpts::command().debug_assert();
        ClientOpts::command().debug_assert();
    }

    #[test]
    fn test_client_action_is_case_insensitive() {
        let opts = ClientOpts::try_parse_from(["shuttle", "host:9032", "PUT", "a.bin"]).unwrap();
        assert_eq!(opts.action, Action::Put);
        assert_eq!(opts.dir, PathBuf::from("."));
        assert!(!opts.progress);

        let opts =
            ClientOpts::try_parse_from(["shuttle", "host", "get", "a.bin", "/tmp", "-p"]).unwrap();
        assert_eq!(opts.action, Action::Get);
        assert_eq!(opts.dir, PathBuf::from("/tmp"));
        assert!(opts.progress);
    }

    #[test]
    fn test_client_rejects_unknown_action() {
        assert!(ClientOpts::try_parse_from(["shuttle", "host", "delete", "a"]).is_err());
        assert!(ClientOpts::try_parse_from(["shuttle", "host", "put"]).is_err());
    }

    #[test]
    fn test_daemon_port_conflicts_with_bind() {
        assert!(DaemonOpts::try_parse_from(["shuttled", "--bind", "a:1", "--port", "2"]).is_err());
        let opts = DaemonOpts::try_parse_from(["shuttled", "-p", "7000", "-q"]).unwrap();
        assert_eq!(opts.port, Some(7000));
        assert!(opts.quiet);
        assert!(opts.bind.is_none());
    }
}
