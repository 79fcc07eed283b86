//! Error types shared by the execution contexts, the remote channel and the
//! transfer orchestrator.
//!
//! [`TransportError`] is what remote transport collaborators report.
//! [`ExecError`] is what callers see: every variant names the phase that
//! failed and keeps the originating cause as its source. Messages never
//! repeat their source; walk [`std::error::Error::source`] to render the
//! whole chain.

use std::io;

use thiserror::Error;

/// Failures reported by a remote transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket or stream failure.
    #[error("I/O error")]
    Io(#[from] io::Error),
    /// Failure reported by libssh2.
    #[error("SSH error")]
    Ssh(#[from] ssh2::Error),
    /// The server rejected every offered credential.
    #[error("authentication failed for user {user}")]
    Authentication {
        /// Account the transport tried to authenticate as.
        user: String,
    },
    /// The server host key did not pass the configured policy.
    #[error("host key verification failed for {host}: {reason}")]
    HostKey {
        /// Host whose key was checked.
        host: String,
        /// Why verification failed.
        reason: String,
    },
    /// Any other transport failure, described in prose.
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced while running commands or orchestrating transfers.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A remote execution context was asked to run without a host.
    #[error("cannot execute ssh command, the remote hostname is not set")]
    MissingHost,
    /// The transport connection could not be established.
    #[error("failed to establish SSH connection to {endpoint}")]
    Connection {
        /// `host:port` that was dialled.
        endpoint: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// The connection was established but no command session could be opened.
    #[error("failed to create SSH session on {endpoint}")]
    Session {
        /// `host:port` of the open connection.
        endpoint: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// The remote command ran and exited with a non-zero status.
    #[error("failed to run remote command [{command}] on {endpoint}: exit status {status}. Output: {output}")]
    RemoteCommand {
        /// `host:port` the command ran on.
        endpoint: String,
        /// Command text, including any directory-change clause.
        command: String,
        /// Exit status reported by the remote side.
        status: i32,
        /// Output captured or streamed while the command ran.
        output: String,
    },
    /// The session broke down while the remote command was running.
    #[error("failed to run remote command [{command}] on {endpoint}")]
    RemoteTransport {
        /// `host:port` the command ran on.
        endpoint: String,
        /// Command text, including any directory-change clause.
        command: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// The local child process could not be started or awaited.
    #[error("failed to run local command `{program}`")]
    LocalSpawn {
        /// Program that was invoked.
        program: String,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The local child process exited unsuccessfully.
    #[error("failed to run local command `{program}`: exit status {status_text}")]
    LocalCommand {
        /// Program that was invoked.
        program: String,
        /// Exit code, when the process was not killed by a signal.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Output captured or forwarded while the command ran.
        output: String,
    },
    /// A tree synchronisation named the local machine as its destination.
    #[error("remote machine cannot be {host}")]
    InvalidTransferTarget {
        /// Host of the rejected destination.
        host: String,
    },
    /// Writing to or reading from one of the I/O context channels failed.
    #[error("failed to forward {stream}")]
    Io {
        /// Channel that failed (`stdout`, `stderr`, `stdin`, `log`).
        stream: &'static str,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    /// Returns `true` when the command ran to completion and reported a
    /// non-zero exit status, as opposed to failing to run at all.
    #[must_use]
    pub const fn is_exit_failure(&self) -> bool {
        matches!(self, Self::RemoteCommand { .. } | Self::LocalCommand { .. })
    }

    /// Exit code of a command that ran and failed, when one is known.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::RemoteCommand { status, .. } => Some(*status),
            Self::LocalCommand { status, .. } => *status,
            _ => None,
        }
    }

    /// Output a failed command produced before it exited.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::RemoteCommand { output, .. } | Self::LocalCommand { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}
