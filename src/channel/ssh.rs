//! `ssh2`-backed transport: TCP connect, handshake, host-key check and
//! authentication, then one exec channel per session.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use ssh2::{CheckResult, ExtendedData, KnownHostFileKind, Session};
use tracing::debug;

use super::{CommandSession, Connection, SessionOutput, SessionStreams, Transport};
use crate::error::TransportError;
use crate::io_context::Source;

/// How the transport proves its identity to the server.
#[derive(Clone, Default)]
pub enum SshAuth {
    /// Ask the running SSH agent.
    #[default]
    Agent,
    /// Use a private key file, optionally protected by a passphrase.
    KeyFile {
        /// Path to the private key.
        path: Utf8PathBuf,
        /// Passphrase unlocking the key.
        passphrase: Option<String>,
    },
    /// Plain password authentication.
    Password(String),
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => f.write_str("Agent"),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// How the server's host key is verified.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents.
    #[default]
    AcceptAny,
    /// Require a matching entry in an OpenSSH `known_hosts` file.
    KnownHosts {
        /// Location of the `known_hosts` file.
        path: Utf8PathBuf,
    },
}

/// Everything needed to dial and authenticate an SSH connection.
#[derive(Clone, Debug, Default)]
pub struct SshConfig {
    /// Account to authenticate as.
    pub user: String,
    /// Authentication method.
    pub auth: SshAuth,
    /// Host-key verification policy.
    pub host_keys: HostKeyPolicy,
}

/// [`Transport`] speaking SSH through libssh2.
#[derive(Clone, Debug, Default)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    /// Creates a transport from its configuration.
    #[must_use]
    pub const fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn verify_host_key(
        &self,
        session: &Session,
        host: &str,
        port: u16,
    ) -> Result<(), TransportError> {
        let HostKeyPolicy::KnownHosts { path } = &self.config.host_keys else {
            return Ok(());
        };

        let mut known_hosts = session.known_hosts()?;
        known_hosts
            .read_file(path.as_std_path(), KnownHostFileKind::OpenSSH)
            .map_err(|err| TransportError::HostKey {
                host: host.to_owned(),
                reason: format!("cannot read {path}: {err}"),
            })?;

        let Some((key, _)) = session.host_key() else {
            return Err(TransportError::HostKey {
                host: host.to_owned(),
                reason: String::from("server presented no host key"),
            });
        };

        let reason = match known_hosts.check_port(host, port, key) {
            CheckResult::Match => return Ok(()),
            CheckResult::Mismatch => "host key does not match the known_hosts entry",
            CheckResult::NotFound => "host is not listed in known_hosts",
            CheckResult::Failure => "host key check failed",
        };
        Err(TransportError::HostKey {
            host: host.to_owned(),
            reason: reason.to_owned(),
        })
    }

    fn authenticate(&self, session: &Session) -> Result<(), TransportError> {
        let user = self.config.user.as_str();
        match &self.config.auth {
            SshAuth::Agent => session.userauth_agent(user)?,
            SshAuth::KeyFile { path, passphrase } => session.userauth_pubkey_file(
                user,
                None,
                path.as_std_path(),
                passphrase.as_deref(),
            )?,
            SshAuth::Password(password) => session.userauth_password(user, password)?,
        }

        if session.authenticated() {
            Ok(())
        } else {
            Err(TransportError::Authentication {
                user: user.to_owned(),
            })
        }
    }
}

impl Transport for SshTransport {
    type Connection = SshConnection;

    fn user(&self) -> &str {
        &self.config.user
    }

    fn dial(&self, host: &str, port: u16) -> Result<Self::Connection, TransportError> {
        let tcp = TcpStream::connect((host, port))?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        // From here on the wrapper owns the session and disconnects it on
        // every failure below.
        let connection = SshConnection { session };
        self.verify_host_key(&connection.session, host, port)?;
        self.authenticate(&connection.session)?;
        debug!(host, port, user = %self.config.user, "ssh handshake complete");
        Ok(connection)
    }
}

/// Authenticated SSH connection. Disconnects when dropped.
pub struct SshConnection {
    session: Session,
}

impl fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConnection").finish_non_exhaustive()
    }
}

impl Connection for SshConnection {
    type Session = SshCommandSession;

    fn open_session(&mut self) -> Result<Self::Session, TransportError> {
        let channel = self.session.channel_session()?;
        Ok(SshCommandSession {
            session: self.session.clone(),
            channel,
        })
    }
}

impl Drop for SshConnection {
    fn drop(&mut self) {
        if let Err(err) = self.session.disconnect(None, "closing", None) {
            debug!(error = %err, "ssh disconnect failed");
        }
    }
}

/// One exec channel on an [`SshConnection`]. Closes the channel when dropped.
///
/// Stdin is written while stdout and stderr are drained, so a command that
/// echoes its input never stalls on a full channel window.
pub struct SshCommandSession {
    session: Session,
    channel: ssh2::Channel,
}

impl fmt::Debug for SshCommandSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCommandSession").finish_non_exhaustive()
    }
}

impl SshCommandSession {
    /// Runs the channel in non-blocking mode until the remote side closes
    /// both output streams, then restores blocking mode.
    fn pump(
        &mut self,
        input: Option<&mut Source>,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), TransportError> {
        self.session.set_blocking(false);
        let result = pump_channel(&mut self.channel, input, out, err);
        self.session.set_blocking(true);
        result?;
        out.flush()?;
        err.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<i32, TransportError> {
        self.channel.wait_close()?;
        Ok(self.channel.exit_status()?)
    }
}

impl CommandSession for SshCommandSession {
    fn capture(
        &mut self,
        command: &str,
        input: Option<&mut Source>,
    ) -> Result<SessionOutput, TransportError> {
        self.channel.handle_extended_data(ExtendedData::Merge)?;
        self.channel.exec(command)?;

        let mut raw = Vec::new();
        self.pump(input, &mut raw, &mut io::sink())?;
        let exit_status = self.finish()?;
        Ok(SessionOutput {
            exit_status,
            output: String::from_utf8_lossy(&raw).into_owned(),
        })
    }

    fn stream(
        &mut self,
        command: &str,
        streams: SessionStreams<'_>,
    ) -> Result<i32, TransportError> {
        let SessionStreams { out, err, input } = streams;
        self.channel.exec(command)?;
        self.pump(input, out, err)?;
        self.finish()
    }
}

impl Drop for SshCommandSession {
    fn drop(&mut self) {
        if let Err(err) = self.channel.close() {
            debug!(error = %err, "ssh channel close failed");
        }
    }
}

/// Bytes moved per read or write on the channel.
const CHUNK_SIZE: usize = 32 * 1024;

/// Pause between polls when no stream made progress.
const IDLE_PAUSE: Duration = Duration::from_millis(5);

/// Non-blocking view of an exec channel.
trait ExecChannel {
    fn write_input(&mut self, data: &[u8]) -> io::Result<usize>;
    fn close_input(&mut self) -> io::Result<()>;
    fn read_output(&mut self, chunk: &mut [u8]) -> io::Result<usize>;
    fn read_error(&mut self, chunk: &mut [u8]) -> io::Result<usize>;
    fn at_eof(&self) -> bool;
}

impl ExecChannel for ssh2::Channel {
    fn write_input(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write(data)
    }

    fn close_input(&mut self) -> io::Result<()> {
        self.send_eof().map_err(io::Error::from)
    }

    fn read_output(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        self.stream(0).read(chunk)
    }

    fn read_error(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(chunk)
    }

    fn at_eof(&self) -> bool {
        self.eof()
    }
}

/// Feeds stdin and drains stdout and stderr in turn until the remote side
/// reaches EOF on both. Input still pending at that point is dropped, like a
/// local child that exits without reading its stdin.
fn pump_channel(
    channel: &mut impl ExecChannel,
    input: Option<&mut Source>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), TransportError> {
    let mut feed = StdinFeed::new(input);
    let mut chunk = vec![0; CHUNK_SIZE];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        let mut progressed = feed.advance(channel)?;
        if out_open {
            let read = channel.read_output(&mut chunk);
            match forward(read, &chunk, out)? {
                Drain::Data => progressed = true,
                Drain::Closed if channel.at_eof() => out_open = false,
                Drain::Closed | Drain::Idle => {}
            }
        }
        if err_open {
            let read = channel.read_error(&mut chunk);
            match forward(read, &chunk, err)? {
                Drain::Data => progressed = true,
                Drain::Closed if channel.at_eof() => err_open = false,
                Drain::Closed | Drain::Idle => {}
            }
        }
        if !progressed {
            thread::sleep(IDLE_PAUSE);
        }
    }
    Ok(())
}

/// Outcome of one non-blocking read from a channel stream.
enum Drain {
    Data,
    Idle,
    Closed,
}

fn forward(
    read: io::Result<usize>,
    chunk: &[u8],
    sink: &mut dyn Write,
) -> Result<Drain, TransportError> {
    match read {
        Ok(0) => Ok(Drain::Closed),
        Ok(count) => {
            sink.write_all(chunk.get(..count).unwrap_or_default())?;
            Ok(Drain::Data)
        }
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(Drain::Idle),
        Err(err) => Err(err.into()),
    }
}

/// Copies a local reader into the channel a chunk at a time, then sends EOF.
struct StdinFeed<'a> {
    source: Option<&'a mut Source>,
    pending: Vec<u8>,
    offset: usize,
    eof_sent: bool,
}

impl<'a> StdinFeed<'a> {
    const fn new(source: Option<&'a mut Source>) -> Self {
        Self {
            source,
            pending: Vec::new(),
            offset: 0,
            eof_sent: false,
        }
    }

    /// Makes one non-blocking step. Returns `true` when bytes or EOF went out.
    fn advance(&mut self, channel: &mut impl ExecChannel) -> Result<bool, TransportError> {
        if self.eof_sent {
            return Ok(false);
        }
        if self.offset == self.pending.len() {
            self.refill()?;
        }

        let unsent = self.pending.get(self.offset..).unwrap_or_default();
        let step = if unsent.is_empty() {
            channel.close_input().map(|()| {
                self.eof_sent = true;
                true
            })
        } else {
            channel.write_input(unsent).map(|written| {
                self.offset += written;
                written > 0
            })
        };
        match step {
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(false),
            other => Ok(other?),
        }
    }

    /// Reads the next chunk from the local source; an exhausted or absent
    /// source leaves `pending` empty.
    fn refill(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        self.offset = 0;
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };
        self.pending.resize(CHUNK_SIZE, 0);
        let read = loop {
            match source.read(&mut self.pending) {
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                other => break other?,
            }
        };
        self.pending.truncate(read);
        if read == 0 {
            self.source = None;
        }
        Ok(())
    }
}
