//! Workflow Runner - resumable, undoable workflow runs
//!
//! A run is one execution of a static workflow definition. The engine keeps
//! the run and its steps in memory, records reversible step changes, and
//! checkpoints everything to a store so a session can be resumed later from
//! its session key. Share tokens expose a read-only projection of a run.

pub mod config;
pub mod engine;
pub mod logging;
pub mod rest;
pub mod session;
pub mod share;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod workflow;
