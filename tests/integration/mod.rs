//! Integration tests for memwatch
//!
//! These drive the public API and the binary end to end, with shell scripts
//! standing in for the external sync tool.

pub mod cli;
pub mod helpers;
pub mod lifecycle;
pub mod sync_flow;
