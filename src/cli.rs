// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `sandcastle`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sandcastle",
    version,
    about = "Import projects, run commands against them in a sandbox, keep snapshots.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Sandcastle.toml` in the current working directory. A
    /// missing file means built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SANDCASTLE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a shell command against the current project.
    Run {
        /// Cancel the command after this long (e.g. "30s", "2m").
        #[arg(long, value_name = "DURATION")]
        timeout: Option<String>,

        /// Command line, passed to the shell as one string.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Import a project from github.com and make it current.
    Import {
        /// e.g. `github.com/owner/name/tree/main/sub/dir`
        reference: String,
    },

    /// Load an exported project file and make it current.
    LoadFile { path: PathBuf },

    /// Write the current project as JSON, or as a zip archive.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,

        /// Write a DEFLATE-compressed zip archive instead of JSON.
        #[arg(long)]
        zip: bool,
    },

    /// Restore the previous snapshot.
    Rollback,

    /// List stored snapshots.
    History,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    /// `--config`, or the default path when it was not given.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_keeps_hyphenated_arguments() {
        let args = CliArgs::try_parse_from([
            "sandcastle",
            "run",
            "--timeout",
            "5s",
            "ls",
            "-la",
        ])
        .unwrap();
        match args.command {
            Command::Run { timeout, command } => {
                assert_eq!(timeout.as_deref(), Some("5s"));
                assert_eq!(command, ["ls", "-la"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_defaults_to_sandcastle_toml() {
        let args = CliArgs::try_parse_from(["sandcastle", "history"]).unwrap();
        assert_eq!(args.config_path(), PathBuf::from("Sandcastle.toml"));

        let args =
            CliArgs::try_parse_from(["sandcastle", "--config", "other.toml", "history"]).unwrap();
        assert_eq!(args.config_path(), PathBuf::from("other.toml"));
    }

    #[test]
    fn export_zip_is_a_flag() {
        let args =
            CliArgs::try_parse_from(["sandcastle", "export", "--zip", "--out", "p.zip"]).unwrap();
        match args.command {
            Command::Export { out, zip } => {
                assert!(zip);
                assert_eq!(out, Some(PathBuf::from("p.zip")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
