//! Schema & Validator, Config Engine, and Template Generator: everything
//! about turning operator-submitted bytes into a versioned, active
//! collector pipeline configuration.

pub mod engine;
pub mod error;
pub mod generator;
pub mod loader;
pub mod persister;
pub mod schema;
pub mod validator;
pub mod version;

pub use engine::ConfigEngine;
pub use error::{ConfigEngineError, ValidationError, ValidationErrorCode};
pub use generator::{canonical_bytes, generate, CollectorConfig};
pub use loader::{load_raw_config, ConfigLoadError};
pub use schema::UserConfig;
pub use version::{ConfigVersion, ConfigVersionStatus};
