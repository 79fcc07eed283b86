//! Binary entry point for the `hostexec` CLI.

use std::error::Error as _;
use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hostexec::{
    CommandInvocation, ConfigError, ExecError, ExecutionContext, IoContext, LocalMachine,
    Location, RemoteConfig, RemoteMachine, SshTransport, copy_file, directory_exists,
    ensure_directory, file_exists, is_local_host, sync_tree,
};

mod cli;

use cli::{Cli, Command, CopyCommand, ExistsCommand, MkdirCommand, RunCommand, SyncCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

/// Machine named on the command line.
enum Target {
    Local(LocalMachine),
    Remote(RemoteMachine<SshTransport>),
}

impl Target {
    fn for_location(config: &RemoteConfig, location: &Location) -> Self {
        match location.host() {
            Some(host) if !is_local_host(host) => {
                Self::Remote(config.remote_machine(host, location.user(), None))
            }
            _ => Self::Local(config.local_machine()),
        }
    }

    fn context(&self) -> &dyn ExecutionContext {
        match self {
            Self::Local(machine) => machine,
            Self::Remote(machine) => machine,
        }
    }
}

/// Exit code for failures of any subcommand except `exists`.
const FAILURE_EXIT: i32 = 1;

/// Exit code for `exists` failures, kept apart from its "absent" code of 1.
const PROBE_FAILURE_EXIT: i32 = 2;

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let failure_code = failure_code(&cli.command);
    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            failure_code
        }
    };

    process::exit(exit_code);
}

const fn failure_code(command: &Command) -> i32 {
    match command {
        Command::Exists(_) => PROBE_FAILURE_EXIT,
        _ => FAILURE_EXIT,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config = RemoteConfig::load_without_cli_args()?;
    config.validate()?;
    let mut io = io_context(cli.verbose);

    match cli.command {
        Command::Run(args) => run_command(&config, &mut io, args),
        Command::Copy(args) => copy_command(&config, &mut io, &args),
        Command::Sync(args) => sync_command(&config, &mut io, &args),
        Command::Mkdir(args) => mkdir_command(&config, &mut io, &args),
        Command::Exists(args) => exists_command(&config, &mut io, &args),
    }
}

fn io_context(verbose: bool) -> IoContext {
    let io = IoContext::stdio();
    if verbose { io.with_log(io::stderr()) } else { io }
}

fn run_command(
    config: &RemoteConfig,
    io: &mut IoContext,
    args: RunCommand,
) -> Result<i32, CliError> {
    let invocation = build_invocation(args.command, args.dir)?;
    let target = match args.host {
        Some(host) if !is_local_host(&host) => Target::Remote(config.remote_machine(
            &host,
            args.user.as_deref(),
            args.port,
        )),
        _ => Target::Local(config.local_machine()),
    };
    let context = target.context();

    let outcome = if args.capture {
        context
            .execute_and_capture(io, &invocation)
            .map(|output| print_output(&output))
    } else {
        context.run(io, &invocation)
    };

    match outcome {
        Ok(()) => Ok(0),
        Err(err) if err.is_exit_failure() => {
            if args.capture {
                print_output(err.output().unwrap_or_default());
            }
            debug!(error = %err, "command exited unsuccessfully");
            Ok(err.exit_code().unwrap_or(1))
        }
        Err(err) => Err(err.into()),
    }
}

fn build_invocation(
    command: Vec<String>,
    dir: Option<String>,
) -> Result<CommandInvocation, CliError> {
    let mut words = command.into_iter();
    let program = words
        .next()
        .ok_or_else(|| CliError::InvalidCommand(String::from("no command given")))?;
    let invocation = CommandInvocation::new(program).args(words);
    Ok(match dir {
        Some(path) => invocation.current_dir(path),
        None => invocation,
    })
}

fn copy_command(
    config: &RemoteConfig,
    io: &mut IoContext,
    args: &CopyCommand,
) -> Result<i32, CliError> {
    let source = Location::parse(&args.source);
    let destination = Location::parse(&args.destination);
    let source_target = Target::for_location(config, &source);
    let destination_target = Target::for_location(config, &destination);

    copy_file(
        io,
        source_target.context(),
        source.path(),
        destination_target.context(),
        destination.path(),
    )?;
    Ok(0)
}

fn sync_command(
    config: &RemoteConfig,
    io: &mut IoContext,
    args: &SyncCommand,
) -> Result<i32, CliError> {
    let source = Location::parse(&args.source);
    let destination = Location::parse(&args.destination);
    let source_target = Target::for_location(config, &source);
    let destination_target = Target::for_location(config, &destination);

    sync_tree(
        io,
        source_target.context(),
        source.path(),
        Utf8Path::new(&args.relative),
        destination_target.context(),
        destination.path(),
        &args.excludes,
    )?;
    Ok(0)
}

fn mkdir_command(
    config: &RemoteConfig,
    io: &mut IoContext,
    args: &MkdirCommand,
) -> Result<i32, CliError> {
    let location = Location::parse(&args.target);
    let target = Target::for_location(config, &location);
    ensure_directory(target.context(), io, location.path())?;
    Ok(0)
}

fn exists_command(
    config: &RemoteConfig,
    io: &mut IoContext,
    args: &ExistsCommand,
) -> Result<i32, CliError> {
    let location = Location::parse(&args.target);
    let target = Target::for_location(config, &location);
    let present = if args.dir {
        directory_exists(target.context(), io, location.path())?
    } else {
        file_exists(target.context(), io, location.path())?
    };
    Ok(i32::from(!present))
}

fn print_output(output: &str) {
    io::stdout().write_all(output.as_bytes()).ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

/// Writes `err` followed by each of its causes, separated by `: `.
fn write_error(mut target: impl Write, err: &CliError) {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    writeln!(target, "{message}").ok();
}
