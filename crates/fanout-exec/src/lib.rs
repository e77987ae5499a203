//! fanout-exec: Execution layer for the fanout tool
//!
//! One SSH session per command, a relay path through a bastion host for
//! privately addressed targets, and local subprocess execution.

pub mod error;
pub mod keys;
pub mod local;
pub mod relay;
pub mod result;
pub mod runner;
pub mod ssh;
