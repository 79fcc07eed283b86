//! Local command execution using `std::process`.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};

use tracing::debug;

use super::{CommandInvocation, ExecutionContext, ExecutionMode, LOCALHOST};
use crate::error::ExecError;
use crate::io_context::{Input, IoContext, STREAMED_OUTPUT_TAIL, SharedBuffer, Tee};

/// Nominal port reported by the local machine; never dialled.
const NOMINAL_PORT: u16 = 22;

/// The machine running this process.
///
/// Commands run as child processes of the current process, in its
/// environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LocalMachine {
    user: String,
}

impl LocalMachine {
    /// Creates the local machine, reporting `user` as its account.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn execute(
        io: &mut IoContext,
        invocation: &CommandInvocation,
        mode: ExecutionMode,
    ) -> Result<String, ExecError> {
        io.log_command(LOCALHOST, invocation.program(), invocation.arguments(), None);
        debug!(
            command = %invocation.command_line(),
            dir = ?invocation.dir(),
            ?mode,
            "running local command"
        );

        let mut child = Self::spawn(io, invocation, mode)?;
        let (status, output) = forward_streams(&mut child, io, mode, invocation.program())?;

        debug!(command = %invocation.program(), %status, "local command finished");

        if status.success() {
            return Ok(output);
        }

        let status_text = status
            .code()
            .map_or_else(|| status.to_string(), |code| code.to_string());
        Err(ExecError::LocalCommand {
            program: invocation.program().to_owned(),
            status: status.code(),
            status_text,
            output,
        })
    }

    fn spawn(
        io: &mut IoContext,
        invocation: &CommandInvocation,
        mode: ExecutionMode,
    ) -> Result<Child, ExecError> {
        let mut command = Command::new(invocation.program());
        command.args(invocation.arguments());
        if let Some(dir) = invocation.dir() {
            command.current_dir(dir);
        }

        command.stdin(stdin_for(io.input(), mode));
        match mode {
            ExecutionMode::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            ExecutionMode::Stream => {
                command
                    .stdout(piped_or_null(io.out().is_some()))
                    .stderr(piped_or_null(io.err().is_some()));
            }
        }

        command.spawn().map_err(|source| ExecError::LocalSpawn {
            program: invocation.program().to_owned(),
            source,
        })
    }
}

impl fmt::Display for LocalMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("local")
    }
}

impl ExecutionContext for LocalMachine {
    fn execute_and_capture(
        &self,
        io: &mut IoContext,
        invocation: &CommandInvocation,
    ) -> Result<String, ExecError> {
        Self::execute(io, invocation, ExecutionMode::Capture)
    }

    fn run(&self, io: &mut IoContext, invocation: &CommandInvocation) -> Result<(), ExecError> {
        Self::execute(io, invocation, ExecutionMode::Stream).map(drop)
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn host(&self) -> &str {
        LOCALHOST
    }

    fn address(&self) -> &str {
        LOCALHOST
    }

    fn port(&self) -> u16 {
        NOMINAL_PORT
    }
}

fn stdin_for(input: Option<&mut Input>, mode: ExecutionMode) -> Stdio {
    match (input, mode) {
        (Some(Input::Reader(_)), _) => Stdio::piped(),
        (Some(Input::Inherit), _) | (None, ExecutionMode::Capture) => Stdio::inherit(),
        (None, ExecutionMode::Stream) => Stdio::null(),
    }
}

fn piped_or_null(attached: bool) -> Stdio {
    if attached {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

/// Pumps the child's pipes until it exits. Capture mode collects stdout and
/// stderr into one buffer; stream mode forwards them to the I/O context and
/// keeps only the latest [`STREAMED_OUTPUT_TAIL`] bytes for the error.
fn forward_streams(
    child: &mut Child,
    io: &mut IoContext,
    mode: ExecutionMode,
    program: &str,
) -> Result<(ExitStatus, String), ExecError> {
    let capture = match mode {
        ExecutionMode::Capture => SharedBuffer::new(),
        ExecutionMode::Stream => SharedBuffer::tail(STREAMED_OUTPUT_TAIL),
    };
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let channels = io.channels();
    let (out_sink, err_sink) = match mode {
        ExecutionMode::Capture => (None, None),
        ExecutionMode::Stream => (channels.out, channels.err),
    };
    let reader = match channels.input {
        Some(Input::Reader(reader)) => Some(reader),
        _ => None,
    };

    thread::scope(|scope| {
        let feeder = reader.zip(stdin).map(|(source, mut pipe)| {
            scope.spawn(move || match io::copy(source, &mut pipe) {
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other.map(drop),
            })
        });
        let out_pump = stdout.map(|pipe| {
            let tee = Tee::new(out_sink, capture.clone());
            scope.spawn(move || pump(pipe, tee))
        });
        let err_pump = stderr.map(|pipe| {
            let tee = Tee::new(err_sink, capture.clone());
            scope.spawn(move || pump(pipe, tee))
        });

        let status = child.wait().map_err(|source| ExecError::LocalSpawn {
            program: program.to_owned(),
            source,
        })?;

        join(feeder, "stdin")?;
        join(out_pump, "stdout")?;
        join(err_pump, "stderr")?;
        Ok((status, capture.contents()))
    })
}

fn pump(mut pipe: impl Read, mut tee: Tee<'_>) -> io::Result<()> {
    io::copy(&mut pipe, &mut tee)?;
    tee.flush()
}

fn join(
    worker: Option<ScopedJoinHandle<'_, io::Result<()>>>,
    stream: &'static str,
) -> Result<(), ExecError> {
    let Some(handle) = worker else {
        return Ok(());
    };
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("stream forwarding thread panicked")))
        .map_err(|source| ExecError::Io { stream, source })
}
