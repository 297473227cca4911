//! Structured execution results.
//!
//! Every invocation of the execution engine produces an [`ExecResult`]: a
//! result kind, a short human message, and a value record carrying the
//! decoded exit information, captured output and per-stream byte counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome classification for one child invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Child exited with status 0, or was terminated by a signal.
    Ok,
    /// Child exited non-zero and the caller did not require success.
    OkNonZeroExit,
    /// Child exited non-zero and the caller required success.
    ErrNonZeroExit,
    /// The child could not be spawned at all.
    ErrExecFailed,
    /// A helper was expected to return an envelope but none was found.
    ErrHelperReturnEmpty,
    /// A helper envelope was found but could not be decoded.
    ErrHelperReturnInvalid,
}

impl ResultKind {
    /// Canonical wire representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::OkNonZeroExit => "OK_NON_ZERO_EXIT",
            Self::ErrNonZeroExit => "ERR_NON_ZERO_EXIT",
            Self::ErrExecFailed => "ERR_EXEC_FAILED",
            Self::ErrHelperReturnEmpty => "ERR_HELPER_RETURN_EMPTY",
            Self::ErrHelperReturnInvalid => "ERR_HELPER_RETURN_INVALID",
        }
    }

    /// True for the kinds that represent a failed invocation.
    pub fn is_err(&self) -> bool {
        matches!(
            self,
            Self::ErrNonZeroExit
                | Self::ErrExecFailed
                | Self::ErrHelperReturnEmpty
                | Self::ErrHelperReturnInvalid
        )
    }
}

impl FromStr for ResultKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OK" => Ok(Self::Ok),
            "OK_NON_ZERO_EXIT" => Ok(Self::OkNonZeroExit),
            "ERR_NON_ZERO_EXIT" => Ok(Self::ErrNonZeroExit),
            "ERR_EXEC_FAILED" => Ok(Self::ErrExecFailed),
            "ERR_HELPER_RETURN_EMPTY" => Ok(Self::ErrHelperReturnEmpty),
            "ERR_HELPER_RETURN_INVALID" => Ok(Self::ErrHelperReturnInvalid),
            other => Err(format!("unknown result kind: {}", other)),
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResultKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Bytes observed on each stream during one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteCounts {
    pub stdin: u64,
    pub stdout: u64,
    pub stderr: u64,
}

/// Decoded exit information and captured output for one invocation.
///
/// Exactly one of `status` and `signal` is set for any child that was
/// actually spawned and reaped. `stdout`/`stderr` carry line-split capture
/// from the full executor; `output` carries the merged byte buffer from the
/// simple executor. Fields that do not apply to a given execution path stay
/// `None` and are omitted from serialized records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecValue {
    /// Exit code after shifting off the signal byte (`raw >> 8`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysret: Option<i32>,
    /// Raw wait status as returned by the operating system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysret_raw: Option<i32>,
    /// Numeric exit code; `None` when the child was killed by a signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    /// Symbolic signal name (e.g. `SIGKILL`); `None` on normal exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    pub coredump: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<Vec<String>>,
    /// Merged stdout+stderr bytes (simple executor only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<u8>>,
    pub bytesnb: ByteCounts,
}

/// The uniform result shape returned by every execution path.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    pub kind: ResultKind,
    pub msg: String,
    pub value: ExecValue,
}

impl ExecResult {
    pub fn new(kind: ResultKind, msg: impl Into<String>, value: ExecValue) -> Self {
        Self {
            kind,
            msg: msg.into(),
            value,
        }
    }

    /// Result for a command that could not be spawned. No child exists, so
    /// the value record carries no decoded fields.
    pub fn exec_failed(msg: impl Into<String>) -> Self {
        Self::new(ResultKind::ErrExecFailed, msg, ExecValue::default())
    }

    pub fn is_ok(&self) -> bool {
        !self.kind.is_err()
    }
}

impl fmt::Display for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}
