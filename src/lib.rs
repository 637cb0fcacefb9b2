//! acoustic-planner library crate
//!
//! Exposes the reconciliation pipeline and project stores so the CLI,
//! benchmarks, and external tooling share one implementation.

pub mod catalog;
pub mod config;
pub mod design;
pub mod history;
pub mod keyring;
pub mod params;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod util;
