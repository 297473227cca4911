//! Argument taint detection.
//!
//! Command tokens come from untrusted request paths. There is no shell
//! between us and `execve`, so the only bytes worth refusing are the ones
//! that corrupt logs or smuggle terminator-delimited content: NUL and
//! control characters. Detection warns and lets the invocation proceed;
//! a genuinely hostile token makes the spawn itself fail.

use std::ffi::OsStr;

/// Inspect a single argument token. Returns a reason when the token is
/// tainted, `None` when it is clean.
pub fn check_token(token: &OsStr) -> Option<String> {
    let bytes = token_bytes(token);
    for &b in bytes {
        if b == 0 {
            return Some("embedded NUL byte".to_string());
        }
        if (b < 0x20 && b != b'\t') || b == 0x7f {
            return Some(format!("control character 0x{:02x}", b));
        }
    }
    None
}

/// Run the taint check over a full argument vector, logging a warning for
/// each tainted token. Never aborts: the caller proceeds to spawn and the
/// operating system gets the final word.
pub fn warn_tainted(args: &[std::ffi::OsString]) {
    for (idx, token) in args.iter().enumerate() {
        if let Some(reason) = check_token(token) {
            log::warn!(
                "tainted argument at position {} ({}): {:?}",
                idx,
                reason,
                token
            );
        }
    }
}

#[cfg(unix)]
fn token_bytes(token: &OsStr) -> &[u8] {
    use std::os::unix::ffi::OsStrExt;
    token.as_bytes()
}

#[cfg(not(unix))]
fn token_bytes(token: &OsStr) -> &[u8] {
    token.to_str().map(str::as_bytes).unwrap_or(&[])
}
