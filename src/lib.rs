//! Execution core for a multi-session UI/API test automation engine.
//!
//! A `Session` owns one driver, a capability-typed backend set, an element
//! store, and an event bus; the `Scheduler` walks a `TestSuite` tree,
//! resolving each keyword's parameters through the `StrategyManager` and
//! publishing lifecycle events as it goes. Suite files (CSV or YAML) and
//! layered configuration feed a `Session` before a run starts; a JUnit
//! report writer and a thin CLI consume its events and tree after.
//!
//! See `SessionManager` for the entry point embedding this crate under a
//! server would use, and `src/bin/optics.rs` for the local, one-shot CLI.

#![forbid(unsafe_code)]

pub mod args;
pub mod backend;
pub mod builtin_keywords;
pub mod config;
pub mod elements;
pub mod error;
pub mod events;
pub mod keywords;
pub mod logging;
pub mod printer;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod session_manager;
pub mod strategy;
pub mod suite;
pub mod tree;
