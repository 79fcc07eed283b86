//! Tests for the remote command lifecycle driven through scripted transports.

use super::*;
use crate::io_context::BufferedIo;
use crate::test_support::{ScriptedSession, ScriptedTransport, TransportLog};
use rstest::{fixture, rstest};

#[fixture]
fn transport() -> ScriptedTransport {
    ScriptedTransport::new("ops")
}

fn run(
    transport: &ScriptedTransport,
    host: &str,
    invocation: &CommandInvocation,
    mode: ExecutionMode,
) -> (Result<String, ExecError>, BufferedIo) {
    let buffered = BufferedIo::new();
    let mut io = buffered.context();
    let result = execute(transport, host, 22, &mut io, invocation, mode);
    (result, buffered)
}

fn assert_released(log: &TransportLog) {
    assert_eq!(log.open_connections, 0, "connection left open: {log:?}");
    assert_eq!(log.open_sessions, 0, "session left open: {log:?}");
}

#[rstest]
fn capture_returns_combined_output_and_logs_outcome(transport: ScriptedTransport) {
    transport.push_exit(0, "out\n", "err\n");
    let invocation = CommandInvocation::new("echo").arg("hi");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Capture);

    assert_eq!(result.expect("command succeeds"), "out\nerr\n");
    assert_eq!(buffered.log(), "[box:22] echo hi\n[box:22] echo hi [OK]\n");
    let log = transport.log();
    assert_eq!(log.dials, ["box:22"]);
    assert_eq!(log.commands, ["echo hi"]);
    assert_eq!(log.sessions_opened, 1);
    assert_released(&log);
}

#[rstest]
fn working_directory_prefixes_command(transport: ScriptedTransport) {
    let invocation = CommandInvocation::new("ls").arg("-la").current_dir("/srv/app");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Capture);

    result.expect("command succeeds");
    assert_eq!(transport.log().commands, ["cd /srv/app && ls -la"]);
    let log = buffered.log();
    assert!(log.starts_with("[box:22] cd /srv/app && ls -la\n"), "log: {log}");
}

#[rstest]
fn command_without_arguments_keeps_trailing_space_in_log(transport: ScriptedTransport) {
    let invocation = CommandInvocation::new("uptime");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Capture);

    result.expect("command succeeds");
    assert_eq!(transport.log().commands, ["uptime"]);
    assert_eq!(buffered.log(), "[box:22] uptime \n[box:22] uptime  [OK]\n");
}

#[rstest]
fn non_zero_exit_keeps_output_and_releases(transport: ScriptedTransport) {
    transport.push_exit(3, "partial", "boom");
    let invocation = CommandInvocation::new("make");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Capture);

    let err = result.expect_err("non-zero exit is an error");
    let ExecError::RemoteCommand {
        ref endpoint,
        ref command,
        status,
        ref output,
    } = err
    else {
        panic!("expected RemoteCommand, got {err:?}");
    };
    assert_eq!(endpoint, "box:22");
    assert_eq!(command, "make");
    assert_eq!(status, 3);
    assert_eq!(output, "partialboom");
    assert!(err.to_string().starts_with("failed to run remote command"));
    assert!(buffered.log().ends_with("[box:22] make  [ERR]\n"));
    assert_released(&transport.log());
}

#[rstest]
fn non_zero_exit_keeps_streamed_output(transport: ScriptedTransport) {
    transport.push_exit(3, "partial", "boom");
    let invocation = CommandInvocation::new("make");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Stream);

    let err = result.expect_err("non-zero exit is an error");
    assert!(matches!(err, ExecError::RemoteCommand { status: 3, .. }), "got {err:?}");
    assert_eq!(err.output(), Some("partialboom"));
    assert_eq!(buffered.out(), "partial");
    assert_eq!(buffered.err(), "boom");
    assert!(buffered.log().ends_with("[box:22] make  [ERR]\n"));
    assert_released(&transport.log());
}

#[rstest]
fn streamed_output_kept_for_errors_is_bounded(transport: ScriptedTransport) {
    let noisy = format!("{}tail end", "x".repeat(STREAMED_OUTPUT_TAIL));
    transport.push_exit(1, &noisy, "");
    let invocation = CommandInvocation::new("rsync");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Stream);

    let err = result.expect_err("non-zero exit is an error");
    let output = err.output().expect("exit failure keeps output");
    assert_eq!(output.len(), STREAMED_OUTPUT_TAIL);
    assert!(output.ends_with("tail end"));
    assert_eq!(buffered.out(), noisy);
}

#[rstest]
fn dial_failure_is_a_connection_error(transport: ScriptedTransport) {
    transport.push(ScriptedSession::DialFailure);
    let invocation = CommandInvocation::new("true");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Stream);

    let err = result.expect_err("dial failure");
    assert!(matches!(err, ExecError::Connection { .. }), "got {err:?}");
    assert!(
        err.to_string()
            .starts_with("failed to establish SSH connection to box:22")
    );
    assert!(buffered.log().is_empty());
    let log = transport.log();
    assert_eq!(log.sessions_opened, 0);
    assert_released(&log);
}

#[rstest]
fn session_failure_closes_connection(transport: ScriptedTransport) {
    transport.push(ScriptedSession::SessionFailure);
    let invocation = CommandInvocation::new("true");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Capture);

    let err = result.expect_err("session failure");
    assert!(matches!(err, ExecError::Session { .. }), "got {err:?}");
    assert!(err.to_string().starts_with("failed to create SSH session"));
    assert!(buffered.log().is_empty());
    assert_released(&transport.log());
}

#[rstest]
#[case::capture(ExecutionMode::Capture)]
#[case::stream(ExecutionMode::Stream)]
fn broken_session_is_a_transport_error(
    transport: ScriptedTransport,
    #[case] mode: ExecutionMode,
) {
    transport.push(ScriptedSession::RunFailure);
    let invocation = CommandInvocation::new("sleep").arg("1");

    let (result, buffered) = run(&transport, "box", &invocation, mode);

    let err = result.expect_err("run failure");
    assert!(matches!(err, ExecError::RemoteTransport { .. }), "got {err:?}");
    assert!(!err.is_exit_failure());
    assert!(buffered.log().ends_with("[box:22] sleep 1 [ERR]\n"));
    assert_released(&transport.log());
}

#[rstest]
fn stream_forwards_each_stream_to_its_channel(transport: ScriptedTransport) {
    transport.push_exit(0, "to stdout", "to stderr");
    let invocation = CommandInvocation::new("build");

    let (result, buffered) = run(&transport, "box", &invocation, ExecutionMode::Stream);

    assert_eq!(result.expect("command succeeds"), "to stdoutto stderr");
    assert_eq!(buffered.out(), "to stdout");
    assert_eq!(buffered.err(), "to stderr");
}

#[rstest]
#[case::capture(ExecutionMode::Capture)]
#[case::stream(ExecutionMode::Stream)]
fn input_reader_is_fed_to_the_session(transport: ScriptedTransport, #[case] mode: ExecutionMode) {
    let invocation = CommandInvocation::new("cat");
    let mut io = IoContext::new().with_input(&b"payload"[..]);

    execute(&transport, "box", 22, &mut io, &invocation, mode).expect("command succeeds");

    assert_eq!(transport.log().inputs, ["payload"]);
}

#[rstest]
fn inherited_input_is_not_forwarded(transport: ScriptedTransport) {
    let invocation = CommandInvocation::new("cat");
    let mut io = IoContext::new().with_inherited_input();

    execute(&transport, "box", 22, &mut io, &invocation, ExecutionMode::Capture)
        .expect("command succeeds");

    assert!(transport.log().inputs.is_empty());
}

#[rstest]
fn missing_channels_are_tolerated(transport: ScriptedTransport) {
    transport.push_exit(0, "ignored", "also ignored");
    let invocation = CommandInvocation::new("echo");
    let mut io = IoContext::new();

    let output = execute(&transport, "box", 22, &mut io, &invocation, ExecutionMode::Stream)
        .expect("command succeeds");

    assert_eq!(output, "ignoredalso ignored");
}

#[rstest]
fn ipv6_endpoint_is_bracketed(transport: ScriptedTransport) {
    let invocation = CommandInvocation::new("id");

    let (result, buffered) = run(&transport, "::1", &invocation, ExecutionMode::Capture);

    result.expect("command succeeds");
    assert_eq!(transport.log().dials, ["[::1]:22"]);
    assert!(buffered.log().starts_with("[[::1]:22] id "));
}

#[rstest]
fn every_call_dials_a_fresh_connection(transport: ScriptedTransport) {
    let invocation = CommandInvocation::new("true");

    for _ in 0..3 {
        let (result, _) = run(&transport, "box", &invocation, ExecutionMode::Capture);
        result.expect("command succeeds");
    }

    let log = transport.log();
    assert_eq!(log.dials.len(), 3);
    assert_eq!(log.sessions_opened, 3);
    assert_released(&log);
}

#[test]
fn remote_command_text_joins_arguments_without_quoting() {
    let invocation = CommandInvocation::new("echo")
        .arg("a b")
        .arg("$HOME")
        .current_dir("/tmp");
    assert_eq!(remote_command_text(&invocation), "cd /tmp && echo a b $HOME");
    assert_eq!(directory_clause(&invocation), "cd /tmp && echo");
}
