//! Shared types for gatehouse components
//!
//! This crate holds the pieces every gatehouse component agrees on: the
//! structured execution result model returned by the execution engine, and
//! the argument taint check applied before a command is handed to the
//! operating system.

pub mod result;
pub mod taint;

pub use result::{ByteCounts, ExecResult, ExecValue, ResultKind};
pub use taint::{check_token, warn_tainted};
