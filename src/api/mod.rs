//! The local Control API: an actix-web server exposing supervisor status
//! and configuration management endpoints, talking to the supervisor actor
//! exclusively through [`client::SupervisorClient`].

pub mod auth;
pub mod client;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{AuthConfig, Role};
pub use client::SupervisorClient;
pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{run, ApiServerError, RunningApiServer};
