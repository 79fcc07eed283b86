//! Execution contexts: the capability to run a command on a machine and to
//! report who and where that machine is.
//!
//! Two implementations share the [`ExecutionContext`] contract:
//! [`LocalMachine`] spawns child processes on this host, while
//! [`RemoteMachine`] drives a fresh remote command channel per call.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ExecError;
use crate::io_context::IoContext;

mod local;
mod remote;

pub use local::LocalMachine;
pub use remote::{DEFAULT_SSH_PORT, RemoteMachine, join_host_port, resolve_address};

/// Host value reserved for the machine running this process.
pub const LOCALHOST: &str = "localhost";

/// Returns `true` when `host` is the local sentinel.
#[must_use]
pub fn is_local_host(host: &str) -> bool {
    host == LOCALHOST
}

/// How a command's output is handled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ExecutionMode {
    /// Wait for the command and return its combined output.
    Capture,
    /// Attach the I/O context's channels while the command runs.
    Stream,
}

/// Program, arguments and optional working directory of one command.
///
/// Arguments are joined with single spaces when sent to a remote shell; they
/// are not quoted, so values containing whitespace or shell metacharacters
/// are split and interpreted by that shell.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandInvocation {
    program: String,
    args: Vec<String>,
    dir: Option<Utf8PathBuf>,
}

impl CommandInvocation {
    /// Starts an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments, preserving their order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the command from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if one was requested.
    #[must_use]
    pub fn dir(&self) -> Option<&Utf8Path> {
        self.dir.as_deref()
    }

    /// Program followed by its arguments, space separated.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            return self.program.clone();
        }
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// A machine commands can run on.
///
/// Two contexts with the same [`host`](ExecutionContext::host) denote the
/// same machine, whatever their other fields say.
pub trait ExecutionContext {
    /// Runs the invocation and returns its combined stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] naming the phase that failed. A command that
    /// exits non-zero yields [`ExecError::LocalCommand`] or
    /// [`ExecError::RemoteCommand`], both of which keep the output.
    fn execute_and_capture(
        &self,
        io: &mut IoContext,
        invocation: &CommandInvocation,
    ) -> Result<String, ExecError>;

    /// Runs the invocation with its streams attached to the I/O context.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionContext::execute_and_capture`].
    fn run(&self, io: &mut IoContext, invocation: &CommandInvocation) -> Result<(), ExecError>;

    /// Account used for authentication and for qualifying remote paths.
    fn user(&self) -> &str;

    /// Identifier of the machine; [`LOCALHOST`] for this one.
    fn host(&self) -> &str;

    /// Network address of the machine.
    fn address(&self) -> &str;

    /// Network port of the machine.
    fn port(&self) -> u16;

    /// Returns `true` for the machine running this process.
    fn is_local(&self) -> bool {
        is_local_host(self.host())
    }

    /// Returns `true` when `other` names the same machine.
    fn same_host(&self, other: &dyn ExecutionContext) -> bool {
        self.host() == other.host()
    }
}

#[cfg(test)]
mod tests;
