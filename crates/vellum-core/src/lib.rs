//! Vellum Core
//!
//! Shared plumbing for the Vellum renderer crates: logging bootstrap,
//! profiling hooks, engine configuration, integer geometry and frame timing.

pub mod config;
pub mod geometry;
pub mod logging;
pub mod profiling;
pub mod time;
