//! porter-ml library crate.
//!
//! Exposes the pipeline engine as a public API so that integration tests
//! in tests/ can import it via `porter_ml::`.
//!
//! The binary entry point (src/main.rs) uses these same modules: a config
//! is validated, `builders::build_pipeline` turns it into a command graph,
//! and `executor::Executor` walks the graph in dependency order, writing a
//! `status.json` report into the workdir as it goes.

pub mod adapter;
pub mod builders;
pub mod command;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod format;
pub mod paths;
pub mod pipeline;
pub mod report;
pub mod sample;
