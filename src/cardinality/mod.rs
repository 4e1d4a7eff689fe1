//! Cardinality Limiter: bounds the number of distinct metric series the
//! agent will track, globally and per metric, under a configurable
//! overflow strategy.

pub mod key;
pub mod limiter;
pub mod strategy;

pub use key::SeriesKey;
pub use limiter::{spawn_window_sweeper, CardinalityLimiter, MetricValue};
pub use strategy::{AdmitDecision, LimitStrategy};
