//! Tests for invocations and the local and remote execution contexts.

use super::*;
use crate::io_context::{BufferedIo, STREAMED_OUTPUT_TAIL, SharedBuffer};
use crate::test_support::ScriptedTransport;
use rstest::rstest;
use tempfile::TempDir;

fn shell(script: &str) -> CommandInvocation {
    CommandInvocation::new("sh").arg("-c").arg(script)
}

#[test]
fn invocation_builder_keeps_argument_order() {
    let invocation = CommandInvocation::new("git")
        .arg("log")
        .args(["--oneline", "-n", "5"])
        .current_dir("/repo");

    assert_eq!(invocation.program(), "git");
    assert_eq!(invocation.arguments(), ["log", "--oneline", "-n", "5"]);
    assert_eq!(invocation.dir(), Some(Utf8Path::new("/repo")));
    assert_eq!(invocation.command_line(), "git log --oneline -n 5");
}

#[test]
fn local_machine_identity() {
    let machine = LocalMachine::new("me");

    assert_eq!(machine.to_string(), "local");
    assert_eq!(machine.user(), "me");
    assert_eq!(machine.host(), LOCALHOST);
    assert_eq!(machine.address(), LOCALHOST);
    assert_eq!(machine.port(), 22);
    assert!(machine.is_local());
}

#[test]
fn local_capture_collects_both_streams() {
    let buffered = BufferedIo::new();
    let mut io = buffered.context();

    let output = LocalMachine::default()
        .execute_and_capture(&mut io, &shell("echo out; echo err >&2"))
        .expect("command succeeds");

    assert!(output.contains("out\n"), "output: {output}");
    assert!(output.contains("err\n"), "output: {output}");
    assert!(buffered.out().is_empty());
    assert_eq!(
        buffered.log(),
        "[localhost] sh -c echo out; echo err >&2\n"
    );
}

#[test]
fn local_run_streams_to_channels() {
    let buffered = BufferedIo::new();
    let mut io = buffered.context();

    LocalMachine::default()
        .run(&mut io, &shell("echo out; echo err >&2"))
        .expect("command succeeds");

    assert_eq!(buffered.out(), "out\n");
    assert_eq!(buffered.err(), "err\n");
}

#[rstest]
#[case::capture(true)]
#[case::stream(false)]
fn local_non_zero_exit_reports_status_and_output(#[case] capture: bool) {
    let buffered = BufferedIo::new();
    let mut io = buffered.context();
    let invocation = shell("echo partial; exit 4");
    let machine = LocalMachine::default();

    let err = if capture {
        machine.execute_and_capture(&mut io, &invocation).map(drop)
    } else {
        machine.run(&mut io, &invocation)
    }
    .expect_err("exit 4 is a failure");

    assert!(err.is_exit_failure());
    assert_eq!(err.exit_code(), Some(4));
    assert_eq!(err.output(), Some("partial\n"));
    assert!(err.to_string().starts_with("failed to run local command `sh`"));
}

#[test]
fn local_streamed_failure_keeps_only_the_output_tail() {
    let buffered = BufferedIo::new();
    let mut io = buffered.context();
    let script = "head -c 70000 /dev/zero | tr '\\0' x; echo; echo last; exit 1";

    let err = LocalMachine::default()
        .run(&mut io, &shell(script))
        .expect_err("exit 1 is a failure");

    let output = err.output().expect("exit failure keeps output");
    assert_eq!(output.len(), STREAMED_OUTPUT_TAIL);
    assert!(output.ends_with("x\nlast\n"), "output tail: {output}");
    assert_eq!(buffered.out().len(), 70_000 + "\nlast\n".len());
}

#[test]
fn local_spawn_failure_is_not_an_exit_failure() {
    let mut io = BufferedIo::new().context();

    let err = LocalMachine::default()
        .run(&mut io, &CommandInvocation::new("hostexec-no-such-program"))
        .expect_err("missing program");

    assert!(matches!(err, ExecError::LocalSpawn { .. }), "got {err:?}");
    assert!(!err.is_exit_failure());
}

#[test]
fn local_command_runs_in_requested_directory() {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8Path::from_path(dir.path()).expect("utf8 temp dir");
    std::fs::write(root.join("marker.txt"), "").expect("write marker");
    let mut io = BufferedIo::new().context();

    let output = LocalMachine::default()
        .execute_and_capture(&mut io, &CommandInvocation::new("ls").current_dir(root))
        .expect("ls succeeds");

    assert_eq!(output, "marker.txt\n");
}

#[test]
fn local_input_reader_feeds_stdin() {
    let out = SharedBuffer::new();
    let mut io = IoContext::new()
        .with_out(out.clone())
        .with_input(&b"fed through stdin"[..]);

    LocalMachine::default()
        .run(&mut io, &CommandInvocation::new("cat"))
        .expect("cat succeeds");

    assert_eq!(out.contents(), "fed through stdin");
}

#[test]
fn local_run_without_channels_discards_output() {
    let mut io = IoContext::new();

    LocalMachine::default()
        .run(&mut io, &shell("echo discarded; cat"))
        .expect("command succeeds with null stdin");
}

#[test]
fn remote_machine_identity() {
    let machine = RemoteMachine::new("box", 2222, ScriptedTransport::new("ops"));

    assert_eq!(machine.to_string(), "ops@box -p 2222");
    assert_eq!(machine.user(), "ops");
    assert_eq!(machine.host(), "box");
    assert_eq!(machine.port(), 2222);
    assert_eq!(machine.endpoint(), "box:2222");
    assert!(!machine.is_local());
}

#[test]
fn remote_machine_without_host_fails_before_dialling() {
    let transport = ScriptedTransport::new("ops");
    let machine = RemoteMachine::with_default_port("", transport.clone());
    let buffered = BufferedIo::new();
    let mut io = buffered.context();

    let err = machine
        .run(&mut io, &CommandInvocation::new("true"))
        .expect_err("empty host");

    assert!(matches!(err, ExecError::MissingHost));
    assert_eq!(
        err.to_string(),
        "cannot execute ssh command, the remote hostname is not set"
    );
    assert!(transport.log().dials.is_empty());
    assert!(buffered.log().is_empty());
}

#[test]
fn remote_machine_runs_through_its_transport() {
    let transport = ScriptedTransport::new("ops");
    transport.push_exit(0, "hello\n", "");
    let machine = RemoteMachine::new("box", 2200, transport.clone());
    let buffered = BufferedIo::new();
    let mut io = buffered.context();

    machine
        .run(&mut io, &CommandInvocation::new("echo").arg("hello"))
        .expect("command succeeds");

    assert_eq!(buffered.out(), "hello\n");
    assert_eq!(transport.log().dials, ["box:2200"]);
    assert_eq!(
        buffered.log(),
        "[box:2200] echo hello\n[box:2200] echo hello [OK]\n"
    );
}

#[test]
fn remote_localhost_counts_as_same_host() {
    let remote = RemoteMachine::with_default_port(LOCALHOST, ScriptedTransport::new("ops"));
    let local = LocalMachine::new("me");

    assert!(remote.is_local());
    assert!(remote.same_host(&local));
    assert!(local.same_host(&remote));
    assert_eq!(remote.address(), LOCALHOST);
}

#[test]
fn remote_address_is_resolved_once() {
    let machine = RemoteMachine::with_default_port("192.0.2.7", ScriptedTransport::new("ops"));

    let first = machine.address();
    let second = machine.address();

    assert_eq!(first, "192.0.2.7");
    assert!(std::ptr::eq(first, second));
}

#[rstest]
#[case("localhost", "localhost")]
#[case("192.0.2.7", "192.0.2.7")]
#[case("::1", "::1")]
#[case("no-such-host.invalid", "no-such-host.invalid")]
fn resolve_address_falls_back_to_host(#[case] host: &str, #[case] expected: &str) {
    assert_eq!(resolve_address(host), expected);
}

#[rstest]
#[case("box", 22, "box:22")]
#[case("10.0.0.1", 2222, "10.0.0.1:2222")]
#[case("::1", 22, "[::1]:22")]
#[case("fe80::1", 2022, "[fe80::1]:2022")]
fn join_host_port_brackets_ipv6(#[case] host: &str, #[case] port: u16, #[case] expected: &str) {
    assert_eq!(join_host_port(host, port), expected);
}
