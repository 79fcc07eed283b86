//! Remote command channel: connect, open a session, run one command, release.
//!
//! The transport itself is an external collaborator described by the
//! [`Transport`], [`Connection`] and [`CommandSession`] traits. The
//! `execute` driver owns the per-call lifecycle:
//!
//! ```text
//! Disconnected → Connected → SessionOpen → Executing → Completed | Failed
//! ```
//!
//! The connection and the session are values scoped to one call, so both are
//! released on every exit path when they drop. Nothing is reused between
//! calls.

use std::io::Write;

use tracing::debug;

use crate::error::{ExecError, TransportError};
use crate::io_context::{Input, IoContext, STREAMED_OUTPUT_TAIL, SharedBuffer, Source, Tee};
use crate::machine::{CommandInvocation, ExecutionMode, join_host_port};

mod ssh;

pub use ssh::{HostKeyPolicy, SshAuth, SshCommandSession, SshConfig, SshConnection, SshTransport};

/// Dials connections to remote hosts. Holds whatever credentials and host
/// verification settings the connection needs.
pub trait Transport {
    /// Connection produced by a successful dial.
    type Connection: Connection;

    /// Account the transport authenticates as.
    fn user(&self) -> &str;

    /// Opens a connection to `host` on `port`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the host cannot be reached or
    /// refuses the connection.
    fn dial(&self, host: &str, port: u16) -> Result<Self::Connection, TransportError>;
}

/// An open transport connection. Dropping it closes the connection.
pub trait Connection {
    /// Session type opened on this connection.
    type Session: CommandSession;

    /// Opens one command session.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the server refuses the session.
    fn open_session(&mut self) -> Result<Self::Session, TransportError>;
}

/// Streams attached to a session running in streaming mode.
pub struct SessionStreams<'a> {
    /// Receives the command's stdout.
    pub out: &'a mut dyn Write,
    /// Receives the command's stderr.
    pub err: &'a mut dyn Write,
    /// Fed to the command's stdin, if present.
    pub input: Option<&'a mut Source>,
}

/// Result of a command that ran to completion on a session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionOutput {
    /// Exit status reported by the remote side.
    pub exit_status: i32,
    /// Combined stdout and stderr.
    pub output: String,
}

/// A session able to run exactly one command. Dropping it closes the session.
pub trait CommandSession {
    /// Runs `command`, waits for it and returns its combined output.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the session breaks down. A non-zero
    /// exit is not an error at this level.
    fn capture(
        &mut self,
        command: &str,
        input: Option<&mut Source>,
    ) -> Result<SessionOutput, TransportError>;

    /// Runs `command` with its streams attached and returns the exit status.
    ///
    /// # Errors
    ///
    /// Same as [`CommandSession::capture`].
    fn stream(&mut self, command: &str, streams: SessionStreams<'_>)
    -> Result<i32, TransportError>;
}

/// Command text without arguments, prefixed with `cd <dir> && ` when the
/// invocation has a working directory.
#[must_use]
pub fn directory_clause(invocation: &CommandInvocation) -> String {
    invocation.dir().map_or_else(
        || invocation.program().to_owned(),
        |dir| format!("cd {dir} && {}", invocation.program()),
    )
}

/// Full command text sent to the remote shell: the directory clause followed
/// by the space-joined arguments. Nothing is quoted.
#[must_use]
pub fn remote_command_text(invocation: &CommandInvocation) -> String {
    let command = directory_clause(invocation);
    if invocation.arguments().is_empty() {
        return command;
    }
    format!("{command} {}", invocation.arguments().join(" "))
}

/// Runs `invocation` on `host:port` through a fresh connection and session.
///
/// Logs `[<endpoint>] <command> <args>` before running and the same line
/// suffixed with `[OK]` or `[ERR]` once the attempt resolves.
pub(crate) fn execute<T: Transport>(
    transport: &T,
    host: &str,
    port: u16,
    io: &mut IoContext,
    invocation: &CommandInvocation,
    mode: ExecutionMode,
) -> Result<String, ExecError> {
    let endpoint = join_host_port(host, port);

    let mut connection = transport
        .dial(host, port)
        .map_err(|source| ExecError::Connection {
            endpoint: endpoint.clone(),
            source,
        })?;
    debug!(%endpoint, user = transport.user(), "connection established");

    let mut session = connection
        .open_session()
        .map_err(|source| ExecError::Session {
            endpoint: endpoint.clone(),
            source,
        })?;

    let command = directory_clause(invocation);
    let text = remote_command_text(invocation);
    io.log_command(&endpoint, &command, invocation.arguments(), None);
    debug!(%endpoint, command = %text, ?mode, "running remote command");

    let outcome = match mode {
        ExecutionMode::Capture => session.capture(&text, reader(io)),
        ExecutionMode::Stream => stream(&mut session, &text, io),
    };

    let succeeded = matches!(outcome, Ok(SessionOutput { exit_status: 0, .. }));
    let flag = if succeeded { "OK" } else { "ERR" };
    io.log_command(&endpoint, &command, invocation.arguments(), Some(flag));

    match outcome {
        Ok(SessionOutput {
            exit_status: 0,
            output,
        }) => Ok(output),
        Ok(SessionOutput {
            exit_status,
            output,
        }) => {
            debug!(%endpoint, command = %text, exit_status, "remote command failed");
            Err(ExecError::RemoteCommand {
                endpoint,
                command,
                status: exit_status,
                output,
            })
        }
        Err(source) => Err(ExecError::RemoteTransport {
            endpoint,
            command,
            source,
        }),
    }
}

fn reader(io: &mut IoContext) -> Option<&mut Source> {
    match io.input() {
        Some(Input::Reader(reader)) => Some(reader),
        _ => None,
    }
}

fn stream<S: CommandSession>(
    session: &mut S,
    text: &str,
    io: &mut IoContext,
) -> Result<SessionOutput, TransportError> {
    let capture = SharedBuffer::tail(STREAMED_OUTPUT_TAIL);
    let channels = io.channels();
    let mut out = Tee::new(channels.out, capture.clone());
    let mut err = Tee::new(channels.err, capture.clone());
    let input = match channels.input {
        Some(Input::Reader(reader)) => Some(reader),
        _ => None,
    };

    let exit_status = session.stream(
        text,
        SessionStreams {
            out: &mut out,
            err: &mut err,
            input,
        },
    )?;
    out.flush()?;
    err.flush()?;

    Ok(SessionOutput {
        exit_status,
        output: capture.contents(),
    })
}

#[cfg(test)]
mod tests;
