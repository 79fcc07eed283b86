//! Copy a file or push a directory tree between two execution contexts.
//!
//! Transfers are delegated to `scp` and `rsync`, run on one of the two
//! contexts: the *orchestrator*. Paths on the orchestrator and on this host
//! stay bare; paths on any other machine are qualified as
//! `<user>@<address>:<path>`.

use std::io::Write;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::error::ExecError;
use crate::io_context::IoContext;
use crate::machine::{CommandInvocation, ExecutionContext};

/// Program used for single-file copies.
pub const SCP_BIN: &str = "scp";

/// Program used for tree synchronisation.
pub const RSYNC_BIN: &str = "rsync";

/// Options every synchronisation starts with: archive mode, relative paths,
/// delete extraneous destination files, verbose output, and `-o`.
pub const RSYNC_MODE_FLAGS: [&str; 5] = ["--archive", "--relative", "--delete", "--verbose", "-o"];

/// Which side of a transfer runs the transfer command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Orchestrator {
    /// The command runs on the source context.
    Source,
    /// The command runs on the destination context.
    Destination,
}

/// What a transfer will do once planned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransferPlan {
    /// Both ends are the same machine; nothing runs.
    Skip {
        /// The shared host.
        host: String,
    },
    /// Run `invocation` on the chosen orchestrator.
    Run {
        /// Side that runs the command.
        orchestrator: Orchestrator,
        /// Transfer command.
        invocation: CommandInvocation,
    },
}

/// Copy of a single file between two contexts, delegated to `scp`.
#[derive(Clone, Copy)]
pub struct FileCopy<'a> {
    /// Context holding the file.
    pub source: &'a dyn ExecutionContext,
    /// Path of the file on the source.
    pub source_path: &'a Utf8Path,
    /// Context receiving the file.
    pub destination: &'a dyn ExecutionContext,
    /// Target path on the destination.
    pub destination_path: &'a Utf8Path,
}

impl FileCopy<'_> {
    /// Decides whether the copy runs and, if so, where and how.
    ///
    /// The destination orchestrates when it is this host, otherwise the
    /// source does.
    #[must_use]
    pub fn plan(&self) -> TransferPlan {
        if self.source.same_host(self.destination) {
            return TransferPlan::Skip {
                host: self.destination.host().to_owned(),
            };
        }

        let orchestrator = if self.destination.is_local() {
            Orchestrator::Destination
        } else {
            Orchestrator::Source
        };
        let source = render_path(
            self.source,
            self.source_path.as_str(),
            orchestrator == Orchestrator::Source,
        );
        let destination = render_path(
            self.destination,
            self.destination_path.as_str(),
            orchestrator == Orchestrator::Destination,
        );

        TransferPlan::Run {
            orchestrator,
            invocation: CommandInvocation::new(SCP_BIN).arg(source).arg(destination),
        }
    }
}

/// Push of a directory tree to a remote context, delegated to `rsync`.
#[derive(Clone, Copy)]
pub struct TreeSync<'a> {
    /// Context holding the tree; always the orchestrator.
    pub source: &'a dyn ExecutionContext,
    /// Anchor directory on the source.
    pub source_root: &'a Utf8Path,
    /// Sub-path below the anchor whose structure is recreated remotely.
    pub source_relative: &'a Utf8Path,
    /// Remote context receiving the tree.
    pub destination: &'a dyn ExecutionContext,
    /// Directory on the destination the relative structure lands in.
    pub destination_root: &'a Utf8Path,
    /// Patterns passed as `--exclude=<pattern>`, in order.
    pub excludes: &'a [String],
}

impl TreeSync<'_> {
    /// Decides whether the synchronisation runs and builds its command.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidTransferTarget`] when the destination is
    /// this host and the source is not.
    pub fn plan(&self) -> Result<TransferPlan, ExecError> {
        if self.source.same_host(self.destination) {
            return Ok(TransferPlan::Skip {
                host: self.destination.host().to_owned(),
            });
        }
        if self.destination.is_local() {
            return Err(ExecError::InvalidTransferTarget {
                host: self.destination.host().to_owned(),
            });
        }

        let excludes = self
            .excludes
            .iter()
            .map(|pattern| format!("--exclude={pattern}"));
        let source = format!("{}/./{}", self.source_root, self.source_relative);
        let destination = qualified_path(self.destination, self.destination_root.as_str());

        Ok(TransferPlan::Run {
            orchestrator: Orchestrator::Source,
            invocation: CommandInvocation::new(RSYNC_BIN)
                .args(RSYNC_MODE_FLAGS)
                .args(excludes)
                .arg(source)
                .arg(destination),
        })
    }
}

/// Copies one file from `source` to `destination` with `scp`.
///
/// When both contexts are the same machine a skip notice is written to the
/// output channel and nothing runs.
///
/// # Errors
///
/// Propagates the orchestrator's [`ExecError`], or [`ExecError::Io`] when the
/// skip notice cannot be written.
pub fn copy_file(
    io: &mut IoContext,
    source: &dyn ExecutionContext,
    source_path: &Utf8Path,
    destination: &dyn ExecutionContext,
    destination_path: &Utf8Path,
) -> Result<(), ExecError> {
    let request = FileCopy {
        source,
        source_path,
        destination,
        destination_path,
    };
    execute(io, request.plan(), source, destination)
}

/// Pushes `<source_root>/<source_relative>` from `source` into
/// `destination_root` on `destination` with `rsync`, keeping the relative
/// structure below `source_root`.
///
/// # Errors
///
/// Returns [`ExecError::InvalidTransferTarget`] when `destination` is this
/// host, and otherwise propagates the source context's [`ExecError`].
pub fn sync_tree(
    io: &mut IoContext,
    source: &dyn ExecutionContext,
    source_root: &Utf8Path,
    source_relative: &Utf8Path,
    destination: &dyn ExecutionContext,
    destination_root: &Utf8Path,
    excludes: &[String],
) -> Result<(), ExecError> {
    let request = TreeSync {
        source,
        source_root,
        source_relative,
        destination,
        destination_root,
        excludes,
    };
    execute(io, request.plan()?, source, destination)
}

/// Notice written to the output channel when a transfer is skipped.
#[must_use]
pub fn skip_notice(host: &str) -> String {
    format!("Skipping, source and destination are the same: {host}\n")
}

fn execute(
    io: &mut IoContext,
    plan: TransferPlan,
    source: &dyn ExecutionContext,
    destination: &dyn ExecutionContext,
) -> Result<(), ExecError> {
    match plan {
        TransferPlan::Skip { host } => {
            info!(%host, "skipping transfer, source and destination are the same");
            let Some(out) = io.out() else {
                return Ok(());
            };
            out.write_all(skip_notice(&host).as_bytes())
                .map_err(|source_err| ExecError::Io {
                    stream: "stdout",
                    source: source_err,
                })
        }
        TransferPlan::Run {
            orchestrator,
            invocation,
        } => {
            let runner = match orchestrator {
                Orchestrator::Source => source,
                Orchestrator::Destination => destination,
            };
            debug!(
                ?orchestrator,
                host = runner.host(),
                command = %invocation.command_line(),
                "running transfer"
            );
            runner.run(io, &invocation)
        }
    }
}

fn render_path(target: &dyn ExecutionContext, path: &str, orchestrates: bool) -> String {
    if target.is_local() || orchestrates {
        path.to_owned()
    } else {
        qualified_path(target, path)
    }
}

fn qualified_path(target: &dyn ExecutionContext, path: &str) -> String {
    format!("{}@{}:{path}", target.user(), target.address())
}
