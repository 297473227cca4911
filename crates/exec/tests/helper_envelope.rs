#![cfg(unix)]
//! End-to-end helper envelope handling: a child embeds its structured
//! result between `JSON_START`/`JSON_END`, the engine captures it intact,
//! and the extractor unwraps it.

use gatehouse_exec::envelope::EnvelopeError;
use gatehouse_exec::{execute, helper_result, ExecOptions, ResultKind};
use std::path::Path;

fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("output.txt");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn helper_envelope_is_captured_and_unwrapped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(
        dir.path(),
        "hi\nJSON_START\n{\"error_code\":\"OK\",\"value\":1,\"error_message\":\"\"}\nJSON_END\nbye\n",
    );

    let opts = ExecOptions::new(["cat".to_string(), path.display().to_string()])
        .is_helper(true)
        .noisy_stdout(true);
    let result = execute(&opts).unwrap();

    assert_eq!(result.kind, ResultKind::Ok);
    // The filter only touches the mirror; capture keeps the envelope.
    let lines = result.value.stdout.as_deref().unwrap();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "hi");
    assert_eq!(lines[1], "JSON_START");
    assert_eq!(lines[4], "bye");

    let helper = helper_result(lines).unwrap();
    assert!(helper.is_ok());
    assert_eq!(helper.value, 1);
    assert_eq!(helper.error_message, "");
}

#[test]
fn capture_is_identical_with_and_without_helper_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(
        dir.path(),
        "before\nJSON_START\n{\"error_code\":\"OK\",\"value\":[1,2],\"error_message\":\"\"}\nJSON_END\nafter\n",
    );
    let cmd = ["cat".to_string(), path.display().to_string()];

    let plain = execute(&ExecOptions::new(cmd.clone())).unwrap();
    let helper = execute(
        &ExecOptions::new(cmd)
            .is_helper(true)
            .noisy_stdout(true),
    )
    .unwrap();

    assert_eq!(plain.value.stdout, helper.value.stdout);
    assert_eq!(plain.value.bytesnb.stdout, helper.value.bytesnb.stdout);
}

#[test]
fn missing_envelope_reports_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "just\nplain\noutput\n");

    let opts = ExecOptions::new(["cat".to_string(), path.display().to_string()]).is_helper(true);
    let result = execute(&opts).unwrap();
    let lines = result.value.stdout.as_deref().unwrap();

    let err = helper_result(lines).unwrap_err();
    assert_eq!(err, EnvelopeError::Empty);
    assert_eq!(err.kind(), ResultKind::ErrHelperReturnEmpty);
}

#[test]
fn undecodable_envelope_reports_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "JSON_START\nthis is not json\nJSON_END\n");

    let opts = ExecOptions::new(["cat".to_string(), path.display().to_string()]);
    let result = execute(&opts).unwrap();
    let lines = result.value.stdout.as_deref().unwrap();

    match helper_result(lines) {
        Err(EnvelopeError::Invalid(msg)) => {
            assert!(!msg.is_empty());
            assert_eq!(
                EnvelopeError::Invalid(msg).kind(),
                ResultKind::ErrHelperReturnInvalid
            );
        }
        other => panic!("expected Invalid, got {:?}", other),
    }
}

#[test]
fn last_completed_envelope_wins_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(
        dir.path(),
        "JSON_START\n{\"error_code\":\"ERR_STALE\",\"value\":null,\"error_message\":\"old\"}\nJSON_END\n\
         JSON_START\n{\"error_code\":\"OK\",\"value\":\"fresh\",\"error_message\":\"\"}\nJSON_END\n",
    );

    let opts = ExecOptions::new(["cat".to_string(), path.display().to_string()]);
    let result = execute(&opts).unwrap();
    let helper = helper_result(result.value.stdout.as_deref().unwrap()).unwrap();
    assert!(helper.is_ok());
    assert_eq!(helper.value, "fresh");
}
