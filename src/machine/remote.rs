//! Remote execution over a per-call command channel.

use std::fmt;
use std::net::ToSocketAddrs;
use std::sync::OnceLock;

use tracing::debug;

use super::{CommandInvocation, ExecutionContext, ExecutionMode, is_local_host};
use crate::channel::{self, Transport};
use crate::error::ExecError;
use crate::io_context::IoContext;

/// Port used when the caller does not pick one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A machine reached through a remote-shell transport.
///
/// Every call dials a fresh connection and opens a single session on it;
/// nothing is pooled or reused between calls. The network address is
/// resolved from the host on first use and cached.
#[derive(Debug)]
pub struct RemoteMachine<T> {
    host: String,
    port: u16,
    address: OnceLock<String>,
    transport: T,
}

impl<T: Transport> RemoteMachine<T> {
    /// Creates a remote machine reached at `host:port` through `transport`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, transport: T) -> Self {
        Self {
            host: host.into(),
            port,
            address: OnceLock::new(),
            transport,
        }
    }

    /// Creates a remote machine on [`DEFAULT_SSH_PORT`].
    #[must_use]
    pub fn with_default_port(host: impl Into<String>, transport: T) -> Self {
        Self::new(host, DEFAULT_SSH_PORT, transport)
    }

    /// Connection endpoint, `host:port` with IPv6 literals bracketed.
    #[must_use]
    pub fn endpoint(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    fn execute(
        &self,
        io: &mut IoContext,
        invocation: &CommandInvocation,
        mode: ExecutionMode,
    ) -> Result<String, ExecError> {
        if self.host.is_empty() {
            return Err(ExecError::MissingHost);
        }
        channel::execute(&self.transport, &self.host, self.port, io, invocation, mode)
    }
}

impl<T: Transport> fmt::Display for RemoteMachine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} -p {}", self.transport.user(), self.host, self.port)
    }
}

impl<T: Transport> ExecutionContext for RemoteMachine<T> {
    fn execute_and_capture(
        &self,
        io: &mut IoContext,
        invocation: &CommandInvocation,
    ) -> Result<String, ExecError> {
        self.execute(io, invocation, ExecutionMode::Capture)
    }

    fn run(&self, io: &mut IoContext, invocation: &CommandInvocation) -> Result<(), ExecError> {
        self.execute(io, invocation, ExecutionMode::Stream).map(drop)
    }

    fn user(&self) -> &str {
        self.transport.user()
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn address(&self) -> &str {
        if let Some(address) = self.address.get() {
            return address;
        }
        // Resolution runs outside the cell; a racing caller may resolve the
        // same host again and its result is discarded.
        let resolved = resolve_address(&self.host);
        self.address.get_or_init(|| resolved)
    }

    fn port(&self) -> u16 {
        self.port
    }
}

/// Joins a host and port into an endpoint, bracketing IPv6 literals.
#[must_use]
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Resolves `host` to its first network address.
///
/// The local sentinel resolves to itself. Lookup failures and empty answers
/// fall back to the host string unchanged.
#[must_use]
pub fn resolve_address(host: &str) -> String {
    if is_local_host(host) {
        return host.to_owned();
    }
    match (host, 0).to_socket_addrs() {
        Ok(mut addresses) => addresses
            .next()
            .map_or_else(|| host.to_owned(), |address| address.ip().to_string()),
        Err(err) => {
            debug!(host, error = %err, "address lookup failed, using host name");
            host.to_owned()
        }
    }
}
