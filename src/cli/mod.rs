//! Command-line interface definitions for the `hostexec` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `hostexec` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hostexec",
    about = "Run commands and move files on this machine or over SSH",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Write the `[endpoint] command args` log lines to stderr.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Operations offered by `hostexec`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run a command locally, or on `--host` over SSH.
    #[command(name = "run", about = "Run a command locally or over SSH")]
    Run(RunCommand),
    /// Copy one file with `scp`.
    #[command(name = "copy", about = "Copy a file between machines with scp")]
    Copy(CopyCommand),
    /// Push a directory tree with `rsync`.
    #[command(
        name = "sync",
        about = "Push a directory tree to a remote machine with rsync"
    )]
    Sync(SyncCommand),
    /// Create a directory and its parents.
    #[command(name = "mkdir", about = "Create a directory and its parents")]
    Mkdir(MkdirCommand),
    /// Probe whether a path exists.
    #[command(
        name = "exists",
        about = "Exit 0 when a path exists, 1 when it does not, 2 on error"
    )]
    Exists(ExistsCommand),
}

/// Arguments for `hostexec run`.
#[derive(Debug, Args)]
pub(crate) struct RunCommand {
    /// Remote host; the command runs locally when omitted.
    #[arg(long, value_name = "HOST")]
    pub(crate) host: Option<String>,
    /// Remote user, overriding `ssh_user` from configuration.
    #[arg(long, value_name = "USER", requires = "host")]
    pub(crate) user: Option<String>,
    /// Remote port, overriding `ssh_port` from configuration.
    #[arg(long, value_name = "PORT", requires = "host")]
    pub(crate) port: Option<u16>,
    /// Working directory for the command.
    #[arg(long, value_name = "DIR")]
    pub(crate) dir: Option<String>,
    /// Collect the combined output and print it once the command exits.
    #[arg(long)]
    pub(crate) capture: bool,
    /// Command to execute (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for `hostexec copy`.
#[derive(Debug, Args)]
pub(crate) struct CopyCommand {
    /// Source file as `path` or `[user@]host:path`.
    pub(crate) source: String,
    /// Destination path as `path` or `[user@]host:path`.
    pub(crate) destination: String,
}

/// Arguments for `hostexec sync`.
#[derive(Debug, Args)]
pub(crate) struct SyncCommand {
    /// Pattern excluded from the transfer; may be repeated.
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub(crate) excludes: Vec<String>,
    /// Anchor directory as `path` or `[user@]host:path`.
    pub(crate) source: String,
    /// Sub-path below the anchor whose structure is recreated.
    pub(crate) relative: String,
    /// Remote destination directory as `[user@]host:path`.
    pub(crate) destination: String,
}

/// Arguments for `hostexec mkdir`.
#[derive(Debug, Args)]
pub(crate) struct MkdirCommand {
    /// Directory as `path` or `[user@]host:path`.
    pub(crate) target: String,
}

/// Arguments for `hostexec exists`.
#[derive(Debug, Args)]
pub(crate) struct ExistsCommand {
    /// Test for a directory instead of a regular file.
    #[arg(long)]
    pub(crate) dir: bool,
    /// Path as `path` or `[user@]host:path`.
    pub(crate) target: String,
}
