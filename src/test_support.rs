//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::channel::{
    CommandSession, Connection, SessionOutput, SessionStreams, Transport, remote_command_text,
};
use crate::error::{ExecError, TransportError};
use crate::io_context::{IoContext, Source};
use crate::machine::{
    CommandInvocation, DEFAULT_SSH_PORT, ExecutionContext, LOCALHOST, is_local_host,
    join_host_port,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScriptedOutcome {
    ExitFailure(i32),
    ConnectionFailure,
}

/// Execution context that never runs anything.
///
/// It renders the command line it would run (`ssh <user>@<host> -- <cmd>`
/// for remote hosts), records it, and for [`ExecutionContext::run`] writes it
/// to the log and output channels without a trailing newline. Outcomes can be
/// scripted in FIFO order; unscripted calls succeed.
#[derive(Clone, Debug, Default)]
pub struct RecordingMachine {
    user: String,
    host: String,
    address: Option<String>,
    port: u16,
    commands: Rc<RefCell<Vec<String>>>,
    outcomes: Rc<RefCell<VecDeque<ScriptedOutcome>>>,
}

impl RecordingMachine {
    /// Creates a machine standing in for this host.
    #[must_use]
    pub fn local(user: impl Into<String>) -> Self {
        Self::remote(user, LOCALHOST, DEFAULT_SSH_PORT)
    }

    /// Creates a machine standing in for `host`.
    #[must_use]
    pub fn remote(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Reports `address` as the network address instead of the host name.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Returns every command line rendered so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Makes the next call fail as a command exiting with `status`.
    pub fn push_exit_failure(&self, status: i32) {
        self.outcomes
            .borrow_mut()
            .push_back(ScriptedOutcome::ExitFailure(status));
    }

    /// Makes the next call fail before any command runs.
    pub fn push_connection_failure(&self) {
        self.outcomes
            .borrow_mut()
            .push_back(ScriptedOutcome::ConnectionFailure);
    }

    /// Command line the machine would run for `invocation`.
    #[must_use]
    pub fn render(&self, invocation: &CommandInvocation) -> String {
        let command = remote_command_text(invocation);
        if is_local_host(&self.host) {
            return command;
        }
        if self.port == 0 || self.port == DEFAULT_SSH_PORT {
            format!("ssh {}@{} -- {command}", self.user, self.host)
        } else {
            format!("ssh {}@{} -p {} -- {command}", self.user, self.host, self.port)
        }
    }

    fn record(&self, invocation: &CommandInvocation) -> Result<String, ExecError> {
        let command = self.render(invocation);
        self.commands.borrow_mut().push(command.clone());
        let Some(outcome) = self.outcomes.borrow_mut().pop_front() else {
            return Ok(command);
        };
        let endpoint = join_host_port(&self.host, self.port);
        Err(match outcome {
            ScriptedOutcome::ConnectionFailure => ExecError::Connection {
                endpoint,
                source: TransportError::Other(String::from("scripted connection failure")),
            },
            ScriptedOutcome::ExitFailure(status) if is_local_host(&self.host) => {
                ExecError::LocalCommand {
                    program: invocation.program().to_owned(),
                    status: Some(status),
                    status_text: status.to_string(),
                    output: String::new(),
                }
            }
            ScriptedOutcome::ExitFailure(status) => ExecError::RemoteCommand {
                endpoint,
                command,
                status,
                output: String::new(),
            },
        })
    }
}

impl ExecutionContext for RecordingMachine {
    fn execute_and_capture(
        &self,
        _io: &mut IoContext,
        invocation: &CommandInvocation,
    ) -> Result<String, ExecError> {
        self.record(invocation)
    }

    fn run(&self, io: &mut IoContext, invocation: &CommandInvocation) -> Result<(), ExecError> {
        let command = self.record(invocation)?;
        if let Some(log) = io.log() {
            write!(log, "{command}").map_err(|source| ExecError::Io {
                stream: "log",
                source,
            })?;
        }
        if let Some(out) = io.out() {
            write!(out, "{command}").map_err(|source| ExecError::Io {
                stream: "stdout",
                source,
            })?;
        }
        Ok(())
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.host)
    }

    fn port(&self) -> u16 {
        self.port
    }
}

/// One scripted dial, consumed in FIFO order by [`ScriptedTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptedSession {
    /// The command runs and exits with `status`.
    Exit {
        /// Exit status to report.
        status: i32,
        /// Text written to stdout.
        stdout: String,
        /// Text written to stderr.
        stderr: String,
    },
    /// The dial itself fails.
    DialFailure,
    /// The connection opens but refuses the session.
    SessionFailure,
    /// The session breaks down while the command runs.
    RunFailure,
}

/// What a [`ScriptedTransport`] observed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransportLog {
    /// Endpoints dialled, in order.
    pub dials: Vec<String>,
    /// Command texts received by sessions, in order.
    pub commands: Vec<String>,
    /// Input fed to each command that received a reader.
    pub inputs: Vec<String>,
    /// Sessions opened over the transport's lifetime.
    pub sessions_opened: usize,
    /// Connections not yet dropped.
    pub open_connections: usize,
    /// Sessions not yet dropped.
    pub open_sessions: usize,
}

/// In-memory [`Transport`] replaying scripted sessions.
///
/// Clones share the script and the log, so a test can keep one handle while
/// the machine under test owns another. Dials with nothing scripted succeed
/// with exit status 0 and no output.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    user: String,
    steps: Rc<RefCell<VecDeque<ScriptedSession>>>,
    log: Rc<RefCell<TransportLog>>,
}

impl ScriptedTransport {
    /// Creates a transport authenticating as `user`.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Queues a scripted session.
    pub fn push(&self, step: ScriptedSession) {
        self.steps.borrow_mut().push_back(step);
    }

    /// Queues a command exiting with `status` after writing both streams.
    pub fn push_exit(&self, status: i32, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.push(ScriptedSession::Exit {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    /// Returns a snapshot of everything observed so far.
    #[must_use]
    pub fn log(&self) -> TransportLog {
        self.log.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    fn user(&self) -> &str {
        &self.user
    }

    fn dial(&self, host: &str, port: u16) -> Result<Self::Connection, TransportError> {
        self.log.borrow_mut().dials.push(join_host_port(host, port));
        let step = self
            .steps
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ScriptedSession::Exit {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        if step == ScriptedSession::DialFailure {
            return Err(TransportError::Other(String::from("scripted dial failure")));
        }
        self.log.borrow_mut().open_connections += 1;
        Ok(ScriptedConnection {
            step: Some(step),
            log: Rc::clone(&self.log),
        })
    }
}

/// Connection handed out by [`ScriptedTransport`].
#[derive(Debug)]
pub struct ScriptedConnection {
    step: Option<ScriptedSession>,
    log: Rc<RefCell<TransportLog>>,
}

impl Connection for ScriptedConnection {
    type Session = ScriptedCommandSession;

    fn open_session(&mut self) -> Result<Self::Session, TransportError> {
        let step = self.step.take();
        if step == Some(ScriptedSession::SessionFailure) {
            return Err(TransportError::Other(String::from("scripted session failure")));
        }
        let mut log = self.log.borrow_mut();
        log.sessions_opened += 1;
        log.open_sessions += 1;
        Ok(ScriptedCommandSession {
            step,
            log: Rc::clone(&self.log),
        })
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        let mut log = self.log.borrow_mut();
        log.open_connections = log.open_connections.saturating_sub(1);
    }
}

/// Session handed out by [`ScriptedConnection`].
#[derive(Debug)]
pub struct ScriptedCommandSession {
    step: Option<ScriptedSession>,
    log: Rc<RefCell<TransportLog>>,
}

impl ScriptedCommandSession {
    fn begin(
        &mut self,
        command: &str,
        input: Option<&mut Source>,
    ) -> Result<(i32, String, String), TransportError> {
        let mut log = self.log.borrow_mut();
        log.commands.push(command.to_owned());
        if let Some(reader) = input {
            let mut fed = String::new();
            reader.read_to_string(&mut fed)?;
            log.inputs.push(fed);
        }
        match self.step.take() {
            Some(ScriptedSession::Exit {
                status,
                stdout,
                stderr,
            }) => Ok((status, stdout, stderr)),
            Some(ScriptedSession::RunFailure) => {
                Err(TransportError::Other(String::from("scripted run failure")))
            }
            _ => Ok((0, String::new(), String::new())),
        }
    }
}

impl CommandSession for ScriptedCommandSession {
    fn capture(
        &mut self,
        command: &str,
        input: Option<&mut Source>,
    ) -> Result<SessionOutput, TransportError> {
        let (exit_status, stdout, stderr) = self.begin(command, input)?;
        Ok(SessionOutput {
            exit_status,
            output: stdout + &stderr,
        })
    }

    fn stream(
        &mut self,
        command: &str,
        streams: SessionStreams<'_>,
    ) -> Result<i32, TransportError> {
        let SessionStreams { out, err, input } = streams;
        let (exit_status, stdout, stderr) = self.begin(command, input)?;
        out.write_all(stdout.as_bytes())?;
        err.write_all(stderr.as_bytes())?;
        Ok(exit_status)
    }
}

impl Drop for ScriptedCommandSession {
    fn drop(&mut self) {
        let mut log = self.log.borrow_mut();
        log.open_sessions = log.open_sessions.saturating_sub(1);
    }
}
