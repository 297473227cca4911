//! Helper envelope handling.
//!
//! A helper child embeds its structured result in stdout between a line
//! containing exactly `JSON_START` and a line containing exactly
//! `JSON_END`. Two consumers care:
//!
//! - [`EnvelopeFilter`] redacts the envelope from the *mirrored* stream so
//!   the caller's terminal only sees the free-form progress lines. Capture
//!   is never touched.
//! - [`extract_payload`] walks *captured* stdout lines and decodes the last
//!   completed envelope; [`helper_result`] projects the decoded payload
//!   back into the `{error_code, value, error_message}` shape helpers use.

use gatehouse_common::ResultKind;
use serde::Deserialize;
use serde_json::Value;

/// Line that opens an envelope.
pub const JSON_START: &str = "JSON_START";
/// Line that closes an envelope.
pub const JSON_END: &str = "JSON_END";

const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Outside,
    Inside,
}

/// Line-oriented redaction state machine over the mirrored byte stream.
///
/// Bytes accumulate into a line buffer until the terminator; the completed
/// line decides the state transition and whether the line is emitted.
/// The incomplete trailing buffer is flushed eagerly at the end of each
/// drain via [`EnvelopeFilter::flush_partial`], so partial progress lines
/// reach the user promptly. A marker split across two reads therefore
/// leaks its already-flushed prefix to the mirror; the completed line
/// still drives the state transition, because emission tracks how much of
/// the buffer was already flushed.
#[derive(Debug)]
pub struct EnvelopeFilter {
    state: FilterState,
    line: Vec<u8>,
    flushed: usize,
}

impl Default for EnvelopeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Outside,
            line: Vec::new(),
            flushed: 0,
        }
    }

    /// Feed a chunk of mirrored bytes; emitted bytes are appended to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        for &b in chunk {
            self.line.push(b);
            if b == LINE_TERMINATOR {
                self.complete_line(out);
            }
        }
    }

    /// Emit whatever incomplete line is pending. Called at the end of each
    /// ready-descriptor drain.
    pub fn flush_partial(&mut self, out: &mut Vec<u8>) {
        if self.state == FilterState::Outside && self.line.len() > self.flushed {
            out.extend_from_slice(&self.line[self.flushed..]);
            self.flushed = self.line.len();
        }
    }

    fn complete_line(&mut self, out: &mut Vec<u8>) {
        let content = &self.line[..self.line.len() - 1];
        if content == JSON_START.as_bytes() {
            self.state = FilterState::Inside;
        } else if self.state == FilterState::Inside && content == JSON_END.as_bytes() {
            self.state = FilterState::Outside;
        } else if self.state == FilterState::Outside {
            out.extend_from_slice(&self.line[self.flushed..]);
        }
        self.line.clear();
        self.flushed = 0;
    }
}

/// Error cases for envelope extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// No completed envelope was found in the input.
    Empty,
    /// An envelope was found but its body is not valid JSON.
    Invalid(String),
}

impl EnvelopeError {
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Empty => ResultKind::ErrHelperReturnEmpty,
            Self::Invalid(_) => ResultKind::ErrHelperReturnInvalid,
        }
    }
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("helper did not return any result"),
            Self::Invalid(msg) => write!(f, "helper returned an invalid result: {}", msg),
        }
    }
}

/// Walk captured stdout lines and decode the last completed envelope.
///
/// Lines must already be stripped of their terminator (the capture split
/// does this). A `JSON_START` seen while a block is open restarts the
/// accumulation; only a block closed by `JSON_END` counts, and later
/// blocks overwrite earlier ones.
pub fn extract_payload<'a, I>(lines: I) -> Result<Value, EnvelopeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut accumulating = false;
    let mut current = Vec::new();
    let mut last_block: Option<String> = None;

    for line in lines {
        if line == JSON_START {
            accumulating = true;
            current.clear();
        } else if accumulating && line == JSON_END {
            accumulating = false;
            last_block = Some(current.join("\n"));
        } else if accumulating {
            current.push(line);
        }
    }

    let block = last_block.ok_or(EnvelopeError::Empty)?;
    serde_json::from_str(&block).map_err(|e| EnvelopeError::Invalid(e.to_string()))
}

/// Convenience form of [`extract_payload`] for a single unsplit string.
pub fn extract_payload_str(text: &str) -> Result<Value, EnvelopeError> {
    extract_payload(text.lines())
}

/// Decoded helper payload: the structured result a helper reports through
/// its envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct HelperResult {
    pub error_code: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub error_message: String,
}

impl HelperResult {
    pub fn is_ok(&self) -> bool {
        self.error_code == "OK" || self.error_code.starts_with("OK_")
    }
}

/// Extract and unwrap a helper envelope from captured stdout lines.
pub fn helper_result<S: AsRef<str>>(lines: &[S]) -> Result<HelperResult, EnvelopeError> {
    let payload = extract_payload(lines.iter().map(AsRef::as_ref))?;
    serde_json::from_value(payload).map_err(|e| EnvelopeError::Invalid(e.to_string()))
}
