//! Exit-status decoding.
//!
//! Maps the raw wait status integer (conventional encoding: low 7 bits =
//! terminating signal, bit 7 = core-dump flag, upper 8 bits = exit code)
//! into the decoded fields of the result model, plus a short human message.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Decoded wait status. Exactly one of `status` and `signal` is set when a
/// child was actually reaped; both stay `None` for the `-1` failure case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub sysret: Option<i32>,
    pub sysret_raw: Option<i32>,
    pub status: Option<i32>,
    pub signal: Option<String>,
    pub coredump: bool,
    pub message: String,
}

/// Signal-number → symbolic-name table, derived once from the host's
/// signal mapping.
fn signal_table() -> &'static HashMap<i32, &'static str> {
    static TABLE: OnceLock<HashMap<i32, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        Signal::iterator()
            .map(|sig| (sig as i32, sig.as_str()))
            .collect()
    })
}

/// Look up the symbolic name for a signal number (e.g. 9 → `SIGKILL`).
pub fn signal_name(signo: i32) -> Option<&'static str> {
    signal_table().get(&signo).copied()
}

/// Decode a raw wait status.
///
/// A raw value of `-1` means the wait call itself failed; the message then
/// carries the errno text and no fields are decoded.
pub fn decode_wait_status(raw: i32) -> StatusInfo {
    if raw == -1 {
        return StatusInfo {
            sysret: None,
            sysret_raw: None,
            status: None,
            signal: None,
            coredump: false,
            message: format!("error: failed to execute ({})", Errno::last().desc()),
        };
    }

    let sysret = raw >> 8;
    let signo = raw & 0x7f;
    if signo != 0 {
        let coredump = raw & 0x80 != 0;
        let name = match signal_name(signo) {
            Some(name) => name.to_string(),
            None => signo.to_string(),
        };
        let mut message = format!("signal {} ({})", signo, name);
        if coredump {
            message.push_str(" and coredump");
        }
        StatusInfo {
            sysret: Some(sysret),
            sysret_raw: Some(raw),
            status: None,
            signal: Some(name),
            coredump,
            message,
        }
    } else {
        StatusInfo {
            sysret: Some(sysret),
            sysret_raw: Some(raw),
            status: Some(sysret),
            signal: None,
            coredump: false,
            message: format!("status {}", sysret),
        }
    }
}
