//! Output, error, log and input channels threaded through every execution.
//!
//! Any channel may be absent. A missing log channel disables command logging;
//! missing output or error channels discard the corresponding stream.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Writable channel owned by an [`IoContext`].
pub type Sink = Box<dyn Write + Send>;

/// Readable channel owned by an [`IoContext`].
pub type Source = Box<dyn Read + Send>;

/// Where a command's standard input comes from.
pub enum Input {
    /// Hand the current process' stdin straight to local child processes.
    /// Remote sessions receive no input in this mode.
    Inherit,
    /// Copy everything the reader yields into the command's stdin.
    Reader(Source),
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Bundle of the four channels passed to every execution call.
#[derive(Default)]
pub struct IoContext {
    out: Option<Sink>,
    err: Option<Sink>,
    log: Option<Sink>,
    input: Option<Input>,
}

/// Disjoint borrows of the streaming channels, so each can be handed to its
/// own forwarding thread.
pub(crate) struct Channels<'a> {
    pub(crate) out: Option<&'a mut Sink>,
    pub(crate) err: Option<&'a mut Sink>,
    pub(crate) input: Option<&'a mut Input>,
}

impl IoContext {
    /// Creates a context with every channel absent.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            out: None,
            err: None,
            log: None,
            input: None,
        }
    }

    /// Wires the process' own stdout, stderr and stdin, without a log channel.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new()
            .with_out(io::stdout())
            .with_err(io::stderr())
            .with_inherited_input()
    }

    /// Sets the output channel.
    #[must_use]
    pub fn with_out(mut self, sink: impl Write + Send + 'static) -> Self {
        self.out = Some(Box::new(sink));
        self
    }

    /// Sets the error channel.
    #[must_use]
    pub fn with_err(mut self, sink: impl Write + Send + 'static) -> Self {
        self.err = Some(Box::new(sink));
        self
    }

    /// Sets the diagnostic log channel.
    #[must_use]
    pub fn with_log(mut self, sink: impl Write + Send + 'static) -> Self {
        self.log = Some(Box::new(sink));
        self
    }

    /// Feeds `reader` to the command's stdin.
    #[must_use]
    pub fn with_input(mut self, reader: impl Read + Send + 'static) -> Self {
        self.input = Some(Input::Reader(Box::new(reader)));
        self
    }

    /// Lets local commands read the current process' stdin directly.
    #[must_use]
    pub fn with_inherited_input(mut self) -> Self {
        self.input = Some(Input::Inherit);
        self
    }

    /// Output channel, if any.
    pub const fn out(&mut self) -> Option<&mut Sink> {
        self.out.as_mut()
    }

    /// Error channel, if any.
    pub const fn err(&mut self) -> Option<&mut Sink> {
        self.err.as_mut()
    }

    /// Diagnostic log channel, if any.
    pub const fn log(&mut self) -> Option<&mut Sink> {
        self.log.as_mut()
    }

    /// Input channel, if any.
    pub const fn input(&mut self) -> Option<&mut Input> {
        self.input.as_mut()
    }

    /// Returns `true` when a log channel is attached.
    #[must_use]
    pub const fn has_log(&self) -> bool {
        self.log.is_some()
    }

    pub(crate) const fn channels(&mut self) -> Channels<'_> {
        Channels {
            out: self.out.as_mut(),
            err: self.err.as_mut(),
            input: self.input.as_mut(),
        }
    }

    /// Writes one diagnostic line, `[<label>] <command> <args>`, optionally
    /// suffixed with `[<flag>]`. Log write failures are ignored.
    pub(crate) fn log_command(
        &mut self,
        label: &str,
        command: &str,
        args: &[String],
        flag: Option<&str>,
    ) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        writeln!(log, "{}", format_log_line(label, command, args, flag)).ok();
    }
}

impl fmt::Debug for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoContext")
            .field("out", &self.out.is_some())
            .field("err", &self.err.is_some())
            .field("log", &self.log.is_some())
            .field("input", &self.input)
            .finish()
    }
}

/// Renders a diagnostic log line without the trailing newline.
#[must_use]
pub fn format_log_line(label: &str, command: &str, args: &[String], flag: Option<&str>) -> String {
    let joined = args.join(" ");
    flag.map_or_else(
        || format!("[{label}] {command} {joined}"),
        |marker| format!("[{label}] {command} {joined} [{marker}]"),
    )
}

/// Bytes of streamed output kept for the error of a failed command.
pub(crate) const STREAMED_OUTPUT_TAIL: usize = 64 * 1024;

/// Cloneable in-memory writer; every clone appends to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
    limit: Option<usize>,
}

impl SharedBuffer {
    /// Creates an empty, unbounded buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer that keeps only the last `limit` bytes written.
    #[must_use]
    pub fn tail(limit: usize) -> Self {
        Self {
            inner: Arc::default(),
            limit: Some(limit),
        }
    }

    /// Returns everything written so far, decoded lossily as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&guard).into_owned()
    }

    /// Returns `true` when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("shared buffer lock poisoned"))?;
        guard.extend_from_slice(buf);
        if let Some(limit) = self.limit {
            let excess = guard.len().saturating_sub(limit);
            guard.drain(..excess);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that forwards to an optional sink and records a copy.
pub(crate) struct Tee<'a> {
    sink: Option<&'a mut Sink>,
    capture: SharedBuffer,
}

impl<'a> Tee<'a> {
    pub(crate) const fn new(sink: Option<&'a mut Sink>, capture: SharedBuffer) -> Self {
        Self { sink, capture }
    }
}

impl Write for Tee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(buf)?;
        }
        self.capture.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.as_mut().map_or(Ok(()), |sink| sink.flush())
    }
}

/// I/O context whose output, error and log channels are in-memory buffers
/// that stay readable after the command finishes.
#[derive(Clone, Debug, Default)]
pub struct BufferedIo {
    out: SharedBuffer,
    err: SharedBuffer,
    log: SharedBuffer,
}

impl BufferedIo {
    /// Creates empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an [`IoContext`] writing into these buffers, with an empty input.
    #[must_use]
    pub fn context(&self) -> IoContext {
        self.context_without_log().with_log(self.log.clone())
    }

    /// Builds an [`IoContext`] writing output and errors into these buffers
    /// while routing the log channel to `log`. [`BufferedIo::log`] then stays
    /// empty.
    #[must_use]
    pub fn context_with_log(&self, log: impl Write + Send + 'static) -> IoContext {
        self.context_without_log().with_log(log)
    }

    fn context_without_log(&self) -> IoContext {
        IoContext::new()
            .with_out(self.out.clone())
            .with_err(self.err.clone())
            .with_input(io::empty())
    }

    /// Everything written to the output channel.
    #[must_use]
    pub fn out(&self) -> String {
        self.out.contents()
    }

    /// Everything written to the error channel.
    #[must_use]
    pub fn err(&self) -> String {
        self.err.contents()
    }

    /// Everything written to the buffered log channel.
    #[must_use]
    pub fn log(&self) -> String {
        self.log.contents()
    }

    /// Output alone when nothing reached the error channel, otherwise both
    /// streams under `stdout:` and `stderr:` headings.
    #[must_use]
    pub fn combined_output(&self) -> String {
        let out = self.out();
        let err = self.err();
        if err.is_empty() {
            out
        } else {
            format!("stdout:\n{out}\nstderr:\n{err}\n")
        }
    }
}
