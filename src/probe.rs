//! Directory creation and existence checks run through an execution context.

use camino::Utf8Path;

use crate::error::ExecError;
use crate::io_context::IoContext;
use crate::machine::{CommandInvocation, ExecutionContext};

/// Creates `path` and any missing parents with `mkdir -p`.
///
/// # Errors
///
/// Any failure, including a non-zero exit, is returned unchanged.
pub fn ensure_directory(
    target: &dyn ExecutionContext,
    io: &mut IoContext,
    path: &Utf8Path,
) -> Result<(), ExecError> {
    let invocation = CommandInvocation::new("mkdir").arg("-p").arg(path.as_str());
    target.run(io, &invocation)
}

/// Returns whether `path` is a regular file on `target`.
///
/// # Errors
///
/// A command that runs and exits non-zero means "absent" and yields
/// `Ok(false)`. Failures to run the check at all are returned.
pub fn file_exists(
    target: &dyn ExecutionContext,
    io: &mut IoContext,
    path: &Utf8Path,
) -> Result<bool, ExecError> {
    test_path(target, io, path, "-f")
}

/// Returns whether `path` is a directory on `target`.
///
/// # Errors
///
/// Same as [`file_exists`].
pub fn directory_exists(
    target: &dyn ExecutionContext,
    io: &mut IoContext,
    path: &Utf8Path,
) -> Result<bool, ExecError> {
    test_path(target, io, path, "-d")
}

fn test_path(
    target: &dyn ExecutionContext,
    io: &mut IoContext,
    path: &Utf8Path,
    flag: &str,
) -> Result<bool, ExecError> {
    let invocation = CommandInvocation::new("test").arg(flag).arg(path.as_str());
    match target.run(io, &invocation) {
        Ok(()) => Ok(true),
        Err(err) if err.is_exit_failure() => Ok(false),
        Err(err) => Err(err),
    }
}
