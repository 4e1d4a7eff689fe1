//! Unified telemetry agent: supervises an embedded collector process,
//! validates and versions its configuration, enforces metric cardinality
//! limits, and exposes a local control API.

pub mod api;
pub mod cardinality;
pub mod cli;
pub mod config;
pub mod context;
pub mod event;
pub mod logging;
pub mod process;
pub mod reload;
pub mod supervisor;
pub mod utils;
