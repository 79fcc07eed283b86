//! Run commands on this machine or over SSH, and move files between them.
//!
//! An [`ExecutionContext`] is a machine commands can run on: the
//! [`LocalMachine`] spawns child processes, a [`RemoteMachine`] opens a fresh
//! SSH connection and session for every call. Both write to the channels of
//! an [`IoContext`], including an optional diagnostic log of
//! `[<endpoint>] <command> <args>` lines.
//!
//! On top of that, [`copy_file`] and [`sync_tree`] delegate transfers to
//! `scp` and `rsync` run on the right side of the transfer, and the
//! [`probe`] functions create directories and test for paths.

pub mod channel;
pub mod config;
pub mod error;
pub mod io_context;
pub mod location;
pub mod machine;
pub mod probe;
pub mod test_support;
pub mod transfer;
pub mod util;

pub use channel::{
    CommandSession, Connection, HostKeyPolicy, SessionOutput, SessionStreams, SshAuth,
    SshConfig, SshTransport, Transport,
};
pub use config::{ConfigError, RemoteConfig};
pub use error::{ExecError, TransportError};
pub use io_context::{BufferedIo, Input, IoContext, SharedBuffer};
pub use location::Location;
pub use machine::{
    CommandInvocation, DEFAULT_SSH_PORT, ExecutionContext, LOCALHOST, LocalMachine,
    RemoteMachine, is_local_host,
};
pub use probe::{directory_exists, ensure_directory, file_exists};
pub use transfer::{FileCopy, TransferPlan, TreeSync, copy_file, sync_tree};
