//! Behavioural tests for the `hostexec run` CLI against the local machine.

#[path = "common/workspace.rs"]
mod workspace;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use predicates::str::contains;
use workspace::Workspace;

fn hostexec(workspace: &Workspace) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("hostexec");
    cmd.current_dir(workspace.root());
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn cli_run_streams_output() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--", "sh", "-c", "echo out; echo err >&2"]);

    cmd.assert().success().stdout("out\n").stderr("err\n");
}

#[test]
fn cli_run_propagates_exit_code() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--", "sh", "-c", "exit 7"]);

    cmd.assert().code(7).stderr("");
}

#[test]
fn cli_run_capture_prints_combined_output() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--capture", "--", "sh", "-c", "echo captured >&2"]);

    cmd.assert().success().stdout("captured\n").stderr("");
}

#[test]
fn cli_run_capture_prints_output_of_failed_command() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--capture", "--", "sh", "-c", "echo partial; exit 3"]);

    cmd.assert().code(3).stdout("partial\n");
}

#[test]
fn cli_run_honours_working_directory() {
    let workspace = Workspace::new();
    workspace.write("inner/marker.txt", "");
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--dir", "inner", "--", "ls"]);

    cmd.assert().success().stdout("marker.txt\n");
}

#[test]
fn cli_verbose_logs_commands_to_stderr() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["--verbose", "run", "--", "true"]);

    cmd.assert()
        .success()
        .stdout("")
        .stderr(contains("[localhost] true \n"));
}

#[test]
fn cli_run_reports_missing_program() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--", "hostexec-no-such-program"]);

    cmd.assert()
        .code(1)
        .stderr(contains("failed to run local command `hostexec-no-such-program`"));
}

#[test]
fn cli_run_on_localhost_host_stays_local() {
    let workspace = Workspace::new();
    let mut cmd = hostexec(&workspace);
    cmd.args(["run", "--host", "localhost", "--", "echo", "here"]);

    cmd.assert()
        .success()
        .stdout("here\n")
        .stderr(contains("SSH").not());
}
