#![cfg(unix)]
//! Integration tests for the full (multiplexing) executor.

use gatehouse_exec::{execute, ExecOptions, ExecResult, ResultKind};
use serial_test::serial;
use std::os::unix::io::AsRawFd;

/// A reaped child carries exactly one of status and signal.
fn assert_status_xor_signal(result: &ExecResult) {
    assert_ne!(
        result.value.status.is_some(),
        result.value.signal.is_some(),
        "status/signal: {:?}",
        result.value
    );
}

#[test]
fn captures_a_single_stdout_line() {
    let opts = ExecOptions::new(["sh", "-c", "echo hello"]);
    let result = execute(&opts).unwrap();

    assert_eq!(result.kind, ResultKind::Ok);
    assert_eq!(result.value.status, Some(0));
    assert_eq!(result.value.signal, None);
    assert_eq!(result.value.stdout.as_deref(), Some(&["hello".to_string()][..]));
    assert_eq!(result.value.stderr.as_deref(), Some(&[][..]));
    assert_eq!(result.value.bytesnb.stdout, 6);
    assert_status_xor_signal(&result);
}

#[test]
fn must_succeed_promotes_nonzero_exit() {
    let opts = ExecOptions::new(["sh", "-c", "exit 3"]).must_succeed(true);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::ErrNonZeroExit);
    assert_eq!(result.value.status, Some(3));
    assert_eq!(result.value.sysret_raw, Some(3 << 8));
    assert_status_xor_signal(&result);
}

#[test]
fn signalled_child_reports_symbolic_signal() {
    let opts = ExecOptions::new(["sh", "-c", "kill -9 $$"]);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::Ok);
    assert_eq!(result.value.status, None);
    assert_eq!(result.value.signal.as_deref(), Some("SIGKILL"));
    assert!(!result.value.coredump);
    assert_eq!(result.msg, "signal 9 (SIGKILL)");
    assert_status_xor_signal(&result);
}

#[test]
fn fixed_stdin_reaches_the_child_and_is_counted() {
    let opts = ExecOptions::new(["cat"]).stdin_str("abc");
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::Ok);
    assert_eq!(result.value.stdout.as_deref(), Some(&["abc".to_string()][..]));
    assert_eq!(result.value.bytesnb.stdin, 3);
    assert_eq!(result.value.bytesnb.stdout, 3);
}

#[test]
fn stdout_cap_forces_shutdown_within_one_buffer() {
    let opts = ExecOptions::new(["yes"]).max_stdout_bytes(1000);
    let result = execute(&opts).unwrap();
    // Either the child noticed the closed pipe and exited, or it was
    // killed by SIGPIPE; both decode cleanly.
    assert_status_xor_signal(&result);
    assert!(result.value.bytesnb.stdout >= 1000);
    assert!(result.value.bytesnb.stdout <= 1000 + 65_535);
    // Everything counted was also captured: nothing is read post-cap.
    let lines = result.value.stdout.as_deref().unwrap();
    assert!(lines.iter().all(|l| l == "y"));
}

#[test]
fn stderr_is_captured_separately() {
    let opts = ExecOptions::new(["sh", "-c", "echo oops 1>&2"]);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::Ok);
    assert_eq!(result.value.stdout.as_deref(), Some(&[][..]));
    assert_eq!(result.value.stderr.as_deref(), Some(&["oops".to_string()][..]));
    assert_eq!(result.value.bytesnb.stderr, 5);
}

#[test]
fn multi_line_capture_round_trips() {
    let opts = ExecOptions::new(["printf", "a\nb\nc\n"]);
    let result = execute(&opts).unwrap();
    let lines = result.value.stdout.as_deref().unwrap();
    assert_eq!(lines, &["a", "b", "c"]);
    // Joining the lines and restoring the trailing terminator reproduces
    // the captured bytes, which the byte count measured.
    let rejoined = format!("{}\n", lines.join("\n"));
    assert_eq!(rejoined.len() as u64, result.value.bytesnb.stdout);
}

#[test]
fn capture_without_trailing_terminator_keeps_last_line() {
    let opts = ExecOptions::new(["printf", "no-newline"]);
    let result = execute(&opts).unwrap();
    let lines = result.value.stdout.as_deref().unwrap();
    assert_eq!(lines, &["no-newline"]);
    assert_eq!(result.value.bytesnb.stdout, 10);
}

#[test]
fn binary_mode_suppresses_capture_but_counts_bytes() {
    let opts = ExecOptions::new(["sh", "-c", "head -c 2048 /dev/zero"]).is_binary(true);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::Ok);
    assert!(result.value.stdout.is_none());
    assert!(result.value.stderr.is_none());
    assert_eq!(result.value.bytesnb.stdout, 2048);
}

#[test]
fn spawn_failure_reports_exec_failed() {
    let opts = ExecOptions::new(["/nonexistent-gatehouse-binary"]);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::ErrExecFailed);
    assert_eq!(result.value.status, None);
    assert_eq!(result.value.signal, None);
}

#[test]
fn helper_and_binary_together_are_rejected() {
    let opts = ExecOptions::new(["true"]).is_helper(true).is_binary(true);
    assert!(execute(&opts).is_err());
}

#[test]
fn system_mode_waits_with_inherited_descriptors() {
    let opts = ExecOptions::new(["sh", "-c", "exit 0"]).system(true);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::Ok);
    assert_eq!(result.value.status, Some(0));
    // No pipes on this path, so nothing is captured or counted.
    assert!(result.value.stdout.is_none());
    assert_eq!(result.value.bytesnb.stdout, 0);

    let opts = ExecOptions::new(["sh", "-c", "exit 7"]).system(true);
    let result = execute(&opts).unwrap();
    assert_eq!(result.kind, ResultKind::OkNonZeroExit);
    assert_eq!(result.value.status, Some(7));
}

#[test]
#[serial]
fn forwards_caller_stdin_to_child_until_eof() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stdin.txt");
    std::fs::write(&path, "hello stdin\n").unwrap();

    // Point the caller's stdin at the file for the duration of the call;
    // EOF on it must propagate as EOF on the child's stdin.
    let file = std::fs::File::open(&path).unwrap();
    let backup = unsafe { libc::dup(libc::STDIN_FILENO) };
    assert!(backup >= 0);
    unsafe {
        libc::dup2(file.as_raw_fd(), libc::STDIN_FILENO);
    }

    let opts = ExecOptions::new(["cat"]).expects_stdin(true);
    let result = execute(&opts);

    unsafe {
        libc::dup2(backup, libc::STDIN_FILENO);
        libc::close(backup);
    }

    let result = result.unwrap();
    assert_eq!(result.kind, ResultKind::Ok);
    assert_eq!(
        result.value.stdout.as_deref(),
        Some(&["hello stdin".to_string()][..])
    );
    assert_eq!(result.value.bytesnb.stdin, 12);
    assert_eq!(result.value.bytesnb.stdout, 12);
}

#[test]
fn interleaved_streams_keep_per_stream_order() {
    let opts = ExecOptions::new([
        "sh",
        "-c",
        "echo o1; echo e1 1>&2; echo o2; echo e2 1>&2",
    ]);
    let result = execute(&opts).unwrap();
    assert_eq!(
        result.value.stdout.as_deref(),
        Some(&["o1".to_string(), "o2".to_string()][..])
    );
    assert_eq!(
        result.value.stderr.as_deref(),
        Some(&["e1".to_string(), "e2".to_string()][..])
    );
}
