//! fanout-core: Domain layer for the fanout tool
//!
//! Input parsing, address classification, result-path naming and the
//! sequential execution engine.

pub mod addr;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod naming;

pub use config::RunConfig;
pub use engine::{Engine, RunSummary};
pub use error::EngineError;
