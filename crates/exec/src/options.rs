//! Invocation options for the execution engine.

use anyhow::{bail, Result};
use std::ffi::OsString;

/// Environment flag that forces both noisy flags on, regardless of what the
/// caller asked for. Set it to any non-empty value.
pub const DEBUG_ENV: &str = "GATEHOUSE_DEBUG";

/// Options for one child invocation.
///
/// Built with [`ExecOptions::new`] plus the chained setters; the defaults
/// are quiet capture with no stdin handling. No shell interpretation is
/// ever applied to `cmd`: the first token is the executable, the rest are
/// its literal arguments.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Argument sequence; first element is the executable.
    pub cmd: Vec<OsString>,
    /// Forward caller stdin to the child until EOF on either side.
    /// `stdin_str` wins when both are set.
    pub expects_stdin: bool,
    /// Fixed bytes written to child stdin in one burst before the
    /// multiplex loop; child stdin is then closed.
    pub stdin_str: Option<Vec<u8>>,
    /// Mirror captured child stdout to caller stdout.
    pub noisy_stdout: bool,
    /// Mirror captured child stderr to caller stderr.
    pub noisy_stderr: bool,
    /// Redact `JSON_START`/`JSON_END` envelopes from the mirrored stdout
    /// stream. Capture is never affected.
    pub is_helper: bool,
    /// Stream binary data: forces both noisy flags on and suppresses
    /// stdout/stderr capture (the caller gets byte counts and exit info).
    pub is_binary: bool,
    /// Promote a non-zero exit to an error-kind result.
    pub must_succeed: bool,
    /// Cap on captured stdout bytes; reaching it force-closes every child
    /// descriptor (and caller stdin, if subscribed) and drains the loop.
    pub max_stdout_bytes: Option<u64>,
    /// Bypass the multiplex path: synchronous fire-and-wait with inherited
    /// descriptors.
    pub system: bool,
}

impl ExecOptions {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn expects_stdin(mut self, yes: bool) -> Self {
        self.expects_stdin = yes;
        self
    }

    pub fn stdin_str(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin_str = Some(bytes.into());
        self
    }

    pub fn noisy_stdout(mut self, yes: bool) -> Self {
        self.noisy_stdout = yes;
        self
    }

    pub fn noisy_stderr(mut self, yes: bool) -> Self {
        self.noisy_stderr = yes;
        self
    }

    pub fn is_helper(mut self, yes: bool) -> Self {
        self.is_helper = yes;
        self
    }

    pub fn is_binary(mut self, yes: bool) -> Self {
        self.is_binary = yes;
        self
    }

    pub fn must_succeed(mut self, yes: bool) -> Self {
        self.must_succeed = yes;
        self
    }

    pub fn max_stdout_bytes(mut self, cap: u64) -> Self {
        self.max_stdout_bytes = Some(cap);
        self
    }

    pub fn system(mut self, yes: bool) -> Self {
        self.system = yes;
        self
    }

    /// Reject combinations the engine cannot honor. `is_helper` would run
    /// the mirrored stream through a line-oriented filter, which is
    /// meaningless for `is_binary` transfers.
    pub fn validate(&self) -> Result<()> {
        if self.cmd.is_empty() {
            bail!("cmd must contain at least the executable");
        }
        if self.is_helper && self.is_binary {
            bail!("is_helper and is_binary are mutually exclusive");
        }
        Ok(())
    }

    /// Effective mirroring flags after applying the `is_binary` implication
    /// and the debug environment override.
    pub fn effective_noisy(&self) -> (bool, bool) {
        let force = self.is_binary || debug_forced();
        (self.noisy_stdout || force, self.noisy_stderr || force)
    }
}

fn debug_forced() -> bool {
    std::env::var_os(DEBUG_ENV).is_some_and(|v| !v.is_empty())
}
