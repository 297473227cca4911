//! Simple executor: merged single-pipe drain.
//!
//! The fast path for callers that need neither tee, stdin forwarding nor
//! byte caps: child stdout and stderr share one pipe and the parent drains
//! it with bulk reads into a single buffer.

use crate::engine::{kind_for, ReapGuard, READ_BUF_SIZE};
use crate::options::ExecOptions;
use anyhow::{Context, Result};
use gatehouse_common::{taint, ByteCounts, ExecResult, ExecValue};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::process::{Command, Stdio};

/// Spawn `opts.cmd` with merged stdout+stderr, drain the pipe to a single
/// buffer, and decode the exit status.
///
/// The result's `output` field carries the merged bytes; the line-split
/// `stdout`/`stderr` fields stay unset on this path.
pub fn execute_simple(opts: &ExecOptions) -> Result<ExecResult> {
    opts.validate()?;
    taint::warn_tainted(&opts.cmd);

    let (read_end, write_end) = nix::unistd::pipe().context("creating merged output pipe")?;
    let write_clone = write_end
        .try_clone()
        .context("duplicating merged output pipe")?;

    let mut command = Command::new(&opts.cmd[0]);
    command
        .args(&opts.cmd[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::from(write_end))
        .stderr(Stdio::from(write_clone));

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(ExecResult::exec_failed(format!(
                "unable to execute {:?}: {}",
                opts.cmd[0], e
            )));
        }
    };
    // The Command retains its copies of the pipe write ends; drop it so the
    // reader sees EOF when the child exits.
    drop(command);

    // The child gets no input on this path.
    drop(child.stdin.take());

    let mut guard = ReapGuard::new(child);
    let mut reader = File::from(read_end);
    let mut output = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("reading merged child output failed: {}", e);
                break;
            }
        }
    }
    drop(reader);

    let info = guard.wait();
    let kind = kind_for(&info, opts.must_succeed);
    let bytesnb = ByteCounts {
        stdout: output.len() as u64,
        ..ByteCounts::default()
    };
    log::debug!(
        "simple exec of {:?} finished: {} ({} merged bytes)",
        opts.cmd[0],
        info.message,
        output.len()
    );
    Ok(ExecResult::new(
        kind,
        info.message.clone(),
        ExecValue {
            sysret: info.sysret,
            sysret_raw: info.sysret_raw,
            status: info.status,
            signal: info.signal,
            coredump: info.coredump,
            output: Some(output),
            bytesnb,
            ..ExecValue::default()
        },
    ))
}
