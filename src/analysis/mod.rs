//! Analysis modules.
//!
//! Turns parsed LLM calls into per-task metrics, response times, completion
//! status and tool usage.

pub mod aggregator;
pub mod timing;

pub use aggregator::*;
pub use timing::*;
