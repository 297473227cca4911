//! Full executor: four-descriptor multiplex loop.
//!
//! The child gets three dedicated pipes. The parent polls child stdout,
//! child stderr and (when subscribed) caller stdin with a 50 ms timeout,
//! drains whichever descriptor is ready, tees output through the resilient
//! writer, and enforces the stdout byte cap. The loop ends when no
//! child-side read descriptor remains; caller stdin alone never keeps it
//! alive.

use crate::envelope::EnvelopeFilter;
use crate::options::ExecOptions;
use crate::status::{decode_wait_status, StatusInfo};
use crate::writer::{write_resilient, LogBudget, WriteOutcome};
use anyhow::{Context, Result};
use gatehouse_common::{taint, ByteCounts, ExecResult, ExecValue, ResultKind};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

/// One read never exceeds this many bytes.
pub(crate) const READ_BUF_SIZE: usize = 65_535;

/// Outer poll timeout; short so cap checks run even under a silent child.
const POLL_TIMEOUT_MS: u8 = 50;

/// Revents that make a descriptor worth a read attempt. HUP and ERR still
/// deliver queued bytes or a clean EOF.
fn is_ready(flags: PollFlags) -> bool {
    flags.intersects(
        PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL,
    )
}

/// Identity of a descriptor in the read set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamTag {
    ChildStdout,
    ChildStderr,
    CallerStdin,
}

/// Owns the child process and guarantees it is reaped. Early returns drop
/// the guard, which kills and waits the child so no zombie survives the
/// invocation context.
pub(crate) struct ReapGuard {
    child: Child,
    reaped: bool,
}

impl ReapGuard {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Block until the child exits and decode its wait status.
    pub(crate) fn wait(&mut self) -> StatusInfo {
        self.reaped = true;
        match self.child.wait() {
            Ok(status) => decode_wait_status(status.into_raw()),
            Err(e) => {
                log::warn!("waiting for child failed: {}", e);
                decode_wait_status(-1)
            }
        }
    }
}

impl Drop for ReapGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Select the result kind from the decoded status. A signalled child (and
/// the wait-failure case) stays `OK`; the caller tells them apart through
/// the value fields.
pub(crate) fn kind_for(info: &StatusInfo, must_succeed: bool) -> ResultKind {
    match info.status {
        Some(0) | None => ResultKind::Ok,
        Some(_) if must_succeed => ResultKind::ErrNonZeroExit,
        Some(_) => ResultKind::OkNonZeroExit,
    }
}

/// Split captured bytes on the line terminator. The trailing empty segment
/// produced by a terminator-ended capture is dropped, so joining the lines
/// with `\n` (plus the optional trailing terminator) reproduces the capture
/// byte-for-byte.
pub(crate) fn split_lines(bytes: &[u8]) -> Vec<String> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = bytes
        .split(|&b| b == b'\n')
        .map(|seg| String::from_utf8_lossy(seg).into_owned())
        .collect();
    if bytes.ends_with(b"\n") {
        lines.pop();
    }
    lines
}

/// Execute `opts.cmd` through the multiplexing engine (or the `system`
/// bypass) and return the structured result.
///
/// Expected child failures (spawn errors, non-zero exits, signals) come
/// back as result kinds, not `Err`; `Err` is reserved for invalid options
/// and internal plumbing failures.
pub fn execute(opts: &ExecOptions) -> Result<ExecResult> {
    opts.validate()?;
    taint::warn_tainted(&opts.cmd);

    if opts.system {
        return execute_system(opts);
    }

    let (noisy_stdout, noisy_stderr) = opts.effective_noisy();

    let mut command = Command::new(&opts.cmd[0]);
    command
        .args(&opts.cmd[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(ExecResult::exec_failed(format!(
                "unable to execute {:?}: {}",
                opts.cmd[0], e
            )));
        }
    };
    drop(command);

    let mut child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();
    let mut guard = ReapGuard::new(child);

    let mut bytes = ByteCounts::default();
    let mut stdin_subscribed = false;

    // Initial stdin handling: a fixed byte string wins over forwarding.
    if let Some(data) = opts.stdin_str.as_deref() {
        if let Some(stdin) = child_stdin.as_mut() {
            if let Err(e) = stdin.write_all(data) {
                log::warn!("writing fixed stdin to child failed: {}", e);
            }
        }
        bytes.stdin += data.len() as u64;
        child_stdin = None;
    } else if opts.expects_stdin {
        stdin_subscribed = true;
    }

    let mut mux = Multiplexer {
        child_stdin,
        child_stdout,
        child_stderr,
        stdin_subscribed,
        noisy_stdout,
        noisy_stderr,
        capture: !opts.is_binary,
        max_stdout_bytes: opts.max_stdout_bytes,
        filter: (opts.is_helper && noisy_stdout).then(EnvelopeFilter::new),
        capture_stdout: Vec::new(),
        capture_stderr: Vec::new(),
        bytes,
        budget: LogBudget::new(),
        cap_hit: false,
    };
    mux.run()?;

    let info = guard.wait();
    let kind = kind_for(&info, opts.must_succeed);
    let (stdout_lines, stderr_lines) = if opts.is_binary {
        (None, None)
    } else {
        (
            Some(split_lines(&mux.capture_stdout)),
            Some(split_lines(&mux.capture_stderr)),
        )
    };
    log::debug!(
        "exec of {:?} finished: {} (stdin {} / stdout {} / stderr {} bytes)",
        opts.cmd[0],
        info.message,
        mux.bytes.stdin,
        mux.bytes.stdout,
        mux.bytes.stderr
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
            stdout: stdout_lines,
            stderr: stderr_lines,
            output: None,
            bytesnb: mux.bytes,
        },
    ))
}

/// `system` bypass: fire-and-wait with inherited descriptors.
fn execute_system(opts: &ExecOptions) -> Result<ExecResult> {
    let mut command = Command::new(&opts.cmd[0]);
    command.args(&opts.cmd[1..]);
    let info = match command.status() {
        Ok(status) => decode_wait_status(status.into_raw()),
        Err(e) => {
            return Ok(ExecResult::exec_failed(format!(
                "unable to execute {:?}: {}",
                opts.cmd[0], e
            )));
        }
    };
    let kind = kind_for(&info, opts.must_succeed);
    Ok(ExecResult::new(
        kind,
        info.message.clone(),
        ExecValue {
            sysret: info.sysret,
            sysret_raw: info.sysret_raw,
            status: info.status,
            signal: info.signal,
            coredump: info.coredump,
            ..ExecValue::default()
        },
    ))
}

struct Multiplexer {
    child_stdin: Option<ChildStdin>,
    child_stdout: Option<ChildStdout>,
    child_stderr: Option<ChildStderr>,
    stdin_subscribed: bool,
    noisy_stdout: bool,
    noisy_stderr: bool,
    capture: bool,
    max_stdout_bytes: Option<u64>,
    filter: Option<EnvelopeFilter>,
    capture_stdout: Vec<u8>,
    capture_stderr: Vec<u8>,
    bytes: ByteCounts,
    budget: LogBudget,
    cap_hit: bool,
}

impl Multiplexer {
    fn run(&mut self) -> Result<()> {
        // Caller stdin alone must not keep the loop alive.
        while self.child_stdout.is_some() || self.child_stderr.is_some() {
            for tag in self.poll_ready()? {
                // A cap shutdown while handling an earlier tag may have
                // removed this one already.
                if !self.is_active(tag) {
                    continue;
                }
                self.drain(tag);
            }
        }
        Ok(())
    }

    fn is_active(&self, tag: StreamTag) -> bool {
        match tag {
            StreamTag::ChildStdout => self.child_stdout.is_some(),
            StreamTag::ChildStderr => self.child_stderr.is_some(),
            StreamTag::CallerStdin => self.stdin_subscribed,
        }
    }

    /// One outer poll round: returns the tags worth a read attempt.
    fn poll_ready(&self) -> Result<Vec<StreamTag>> {
        let stdin_handle = io::stdin();
        let mut tags = Vec::with_capacity(3);
        let mut fds = Vec::with_capacity(3);
        if let Some(ref s) = self.child_stdout {
            tags.push(StreamTag::ChildStdout);
            fds.push(PollFd::new(s.as_fd(), PollFlags::POLLIN));
        }
        if let Some(ref s) = self.child_stderr {
            tags.push(StreamTag::ChildStderr);
            fds.push(PollFd::new(s.as_fd(), PollFlags::POLLIN));
        }
        if self.stdin_subscribed {
            tags.push(StreamTag::CallerStdin);
            fds.push(PollFd::new(stdin_handle.as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
            Ok(0) => Ok(Vec::new()),
            Ok(_) => Ok(fds
                .iter()
                .zip(tags)
                .filter(|(fd, _)| fd.revents().is_some_and(is_ready))
                .map(|(_, tag)| tag)
                .collect()),
            Err(Errno::EINTR) => Ok(Vec::new()),
            Err(e) => Err(e).context("polling child descriptors"),
        }
    }

    /// Zero-timeout re-poll of a single descriptor: does it have more
    /// bytes queued right now?
    fn ready_now(&self, tag: StreamTag) -> bool {
        let stdin_handle = io::stdin();
        let fd = match tag {
            StreamTag::ChildStdout => match self.child_stdout.as_ref() {
                Some(s) => s.as_fd(),
                None => return false,
            },
            StreamTag::ChildStderr => match self.child_stderr.as_ref() {
                Some(s) => s.as_fd(),
                None => return false,
            },
            StreamTag::CallerStdin => {
                if !self.stdin_subscribed {
                    return false;
                }
                stdin_handle.as_fd()
            }
        };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(n) if n > 0 => fds[0].revents().is_some_and(is_ready),
            _ => false,
        }
    }

    /// Read a ready descriptor until its queue is momentarily empty,
    /// bounding outer-poll round-trips under a chatty child.
    fn drain(&mut self, tag: StreamTag) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            match self.read_tag(tag, &mut buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.budget.try_take() {
                        log::info!("read error on {:?}: {}, dropping descriptor", tag, e);
                    }
                    self.remove(tag);
                    break;
                }
                Ok(0) => {
                    self.remove(tag);
                    if tag == StreamTag::CallerStdin {
                        // EOF from the caller means the child gets EOF too.
                        self.child_stdin = None;
                    }
                    break;
                }
                Ok(n) => {
                    self.handle_bytes(tag, &buf[..n]);
                    if self.cap_hit {
                        break;
                    }
                }
            }
            if !self.ready_now(tag) {
                break;
            }
        }
        if tag == StreamTag::ChildStdout {
            self.flush_mirror_partial();
        }
    }

    fn read_tag(&mut self, tag: StreamTag, buf: &mut [u8]) -> io::Result<usize> {
        match tag {
            StreamTag::ChildStdout => match self.child_stdout.as_mut() {
                Some(s) => s.read(buf),
                None => Ok(0),
            },
            StreamTag::ChildStderr => match self.child_stderr.as_mut() {
                Some(s) => s.read(buf),
                None => Ok(0),
            },
            StreamTag::CallerStdin => io::stdin().lock().read(buf),
        }
    }

    fn remove(&mut self, tag: StreamTag) {
        match tag {
            StreamTag::ChildStdout => self.child_stdout = None,
            StreamTag::ChildStderr => self.child_stderr = None,
            StreamTag::CallerStdin => self.stdin_subscribed = false,
        }
    }

    fn handle_bytes(&mut self, tag: StreamTag, chunk: &[u8]) {
        match tag {
            StreamTag::ChildStderr => {
                self.bytes.stderr += chunk.len() as u64;
                if self.capture {
                    self.capture_stderr.extend_from_slice(chunk);
                }
                if self.noisy_stderr {
                    let outcome = write_resilient(
                        &mut io::stderr().lock(),
                        "mirror stderr",
                        chunk,
                        &mut self.budget,
                    );
                    if outcome == WriteOutcome::Closed {
                        self.noisy_stderr = false;
                    }
                }
            }
            StreamTag::ChildStdout => {
                self.bytes.stdout += chunk.len() as u64;
                if self.capture {
                    self.capture_stdout.extend_from_slice(chunk);
                }
                if self.noisy_stdout {
                    if self.filter.is_some() {
                        let mut emitted = Vec::new();
                        if let Some(filter) = self.filter.as_mut() {
                            filter.feed(chunk, &mut emitted);
                        }
                        if !emitted.is_empty() {
                            self.mirror_stdout(&emitted);
                        }
                    } else {
                        self.mirror_stdout(chunk);
                    }
                }
                if let Some(cap) = self.max_stdout_bytes {
                    if self.bytes.stdout >= cap {
                        self.cap_shutdown();
                    }
                }
            }
            StreamTag::CallerStdin => {
                self.bytes.stdin += chunk.len() as u64;
                if let Some(stdin) = self.child_stdin.as_mut() {
                    let outcome = write_resilient(stdin, "child stdin", chunk, &mut self.budget);
                    if outcome == WriteOutcome::Closed {
                        self.child_stdin = None;
                    }
                }
            }
        }
    }

    fn mirror_stdout(&mut self, data: &[u8]) {
        let outcome = write_resilient(
            &mut io::stdout().lock(),
            "mirror stdout",
            data,
            &mut self.budget,
        );
        if outcome == WriteOutcome::Closed {
            self.noisy_stdout = false;
        }
    }

    /// Eagerly mirror the filter's incomplete trailing line at the end of
    /// a stdout drain, so partial progress lines stay visible.
    fn flush_mirror_partial(&mut self) {
        if !self.noisy_stdout {
            return;
        }
        let mut emitted = Vec::new();
        if let Some(filter) = self.filter.as_mut() {
            filter.flush_partial(&mut emitted);
        }
        if !emitted.is_empty() {
            self.mirror_stdout(&emitted);
        }
    }

    /// The stdout byte budget is spent: force-close every child descriptor
    /// and caller stdin (when subscribed), draining the loop. The child
    /// sees EPIPE on its next write and exits on its own schedule.
    fn cap_shutdown(&mut self) {
        log::debug!(
            "stdout byte cap reached at {} bytes, closing all descriptors",
            self.bytes.stdout
        );
        self.child_stdin = None;
        self.child_stdout = None;
        self.child_stderr = None;
        if self.stdin_subscribed {
            self.stdin_subscribed = false;
            // The contract gives the executor exclusive use of the
            // caller's stdin for the call; std exposes no owned handle to
            // fd 0, so the close goes through libc.
            unsafe {
                libc::close(libc::STDIN_FILENO);
            }
        }
        self.cap_hit = true;
    }
}
