//! # `taskflow`
//!
//! Dependency graphs and Kanban bucket ordering for task boards, stored in
//! SQLite. See [`flow`] for the engine and [`guard`] for access control.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod guard;
pub mod logging;
pub mod paths;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
