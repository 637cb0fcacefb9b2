//! Generation service access
//!
//! Design requests are slow (minutes, not seconds) and are always answered
//! in blocking mode. Every answer is tagged with the id of the request that
//! produced it so stale answers can be told apart from current ones.

mod client;

pub use client::{ChatflowClient, DesignOutcome, GenerationOutcome};
