//! Blue-Green Reload Strategy: swap the running collector onto a new
//! configuration without a gap in coverage.

pub mod strategy;

pub use strategy::{BlueGreenReload, ReloadError, ReloadOutcome, ReloadStrategyConfig, Slot};
