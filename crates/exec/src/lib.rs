//! Gatehouse subprocess execution engine
//!
//! This library launches a child command, shuttles bytes between the
//! caller's standard streams and the child's, optionally mirrors (tees)
//! child output back to the caller's terminal, enforces byte budgets, and
//! reports the child's fate as a structured [`ExecResult`].
//!
//! ## Architecture
//!
//! Two execution paths share the exit-status decoder and result model:
//! 1. [`execute_simple`] merges child stdout+stderr into one pipe and
//!    drains it with bulk reads: the fast path when neither tee nor stdin
//!    forwarding is needed.
//! 2. [`execute`] gives the child three pipes and multiplexes up to four
//!    descriptors with a 50 ms poll loop, teeing output through a
//!    partial-write-resilient writer and redacting helper envelopes from
//!    the mirrored stream.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gatehouse_exec::{execute, ExecOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let opts = ExecOptions::new(["uname", "-a"]).noisy_stdout(true);
//!     let result = execute(&opts)?;
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

pub mod envelope;
pub mod options;
pub mod status;

mod engine;
mod simple;
mod writer;

pub use engine::execute;
pub use envelope::{extract_payload, extract_payload_str, helper_result, EnvelopeFilter, HelperResult};
pub use options::ExecOptions;
pub use simple::execute_simple;
pub use status::{decode_wait_status, signal_name, StatusInfo};

// Re-export the shared result model so most callers need only this crate.
pub use gatehouse_common::{ByteCounts, ExecResult, ExecValue, ResultKind};
