//! Daemon config file (TOML) merged under command-line options

use crate::cli::DaemonOpts;
use crate::protocol::DEFAULT_PORT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape; every key optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub bind: Option<String>,
    pub root: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub journal: Option<PathBuf>,
    pub free_space: Option<u64>,
    pub quiet: bool,
}

/// Effective daemon settings after merging
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub bind: String,
    pub root: PathBuf,
    pub log_file: Option<PathBuf>,
    pub journal: Option<PathBuf>,
    pub free_space: Option<u64>,
    pub quiet: bool,
}

pub fn default_bind() -> String {
    format!("0.0.0.0:{}", DEFAULT_PORT)
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// CLI wins over the file, the file wins over defaults
    pub fn merge_cli(self, opts: &DaemonOpts) -> Settings {
        let bind = match (&opts.bind, opts.port) {
            (Some(bind), _) => bind.clone(),
            (None, Some(port)) => format!("0.0.0.0:{}", port),
            (None, None) => self.bind.unwrap_or_else(default_bind),
        };
        Settings {
            bind,
            root: opts
                .root
                .clone()
                .or(self.root)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_file: opts.log_file.clone().or(self.log_file),
            journal: opts.journal.clone().or(self.journal),
            free_space: opts.free_space.or(self.free_space),
            quiet: opts.quiet || self.quiet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn opts(args: &[&str]) -> DaemonOpts {
        let mut argv = vec!["shuttled"];
        argv.extend_from_slice(args);
        DaemonOpts::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = DaemonConfig::default().merge_cli(&opts(&[]));
        assert_eq!(settings.bind, "0.0.0.0:9032");
        assert_eq!(settings.root, PathBuf::from("."));
        assert!(settings.journal.is_none());
        assert!(settings.free_space.is_none());
        assert!(!settings.quiet);
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shuttled.toml");
        std::fs::write(
            &path,
            "bind = \"127.0.0.1:7000\"\nroot = \"/srv/files\"\nfree_space = 1024\nquiet = true\n",
        )
        .unwrap();
        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.free_space, Some(1024));

        let settings = config.clone().merge_cli(&opts(&["--root", "/data"]));
        assert_eq!(settings.bind, "127.0.0.1:7000");
        assert_eq!(settings.root, PathBuf::from("/data"));
        assert_eq!(settings.free_space, Some(1024));
        assert!(settings.quiet);

        let settings = config.merge_cli(&opts(&["--port", "9100"]));
        assert_eq!(settings.bind, "0.0.0.0:9100");
        assert_eq!(settings.root, PathBuf::from("/srv/files"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "bnid = \"x\"\n").unwrap();
        let err = DaemonConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(DaemonConfig::load(&temp_dir.path().join("nope.toml")).is_err());
    }
}
