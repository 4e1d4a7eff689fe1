//! Wire types for the Control API. Kept separate from the domain types in
//! `config`/`supervisor` so a field rename for JSON compatibility never
//! forces a rename in the domain model, mirroring the teacher's dedicated
//! `http_server::status` DTOs over its internal `SubAgent` state.

use serde::Serialize;

use super::error::ApiErrorCode;
use crate::config::{ConfigVersion, ConfigVersionStatus, ValidationError};
use crate::supervisor::{SupervisorState, SupervisorStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub state: SupervisorState,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SupervisorState,
    pub current_version: Option<u64>,
    pub collector_pid: Option<u32>,
    pub consecutive_failures: u32,
}

impl From<SupervisorStatus> for StatusResponse {
    fn from(status: SupervisorStatus) -> Self {
        Self {
            state: status.state,
            current_version: status.current_version,
            collector_pid: status.collector_pid,
            consecutive_failures: status.consecutive_failures,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub id: u64,
    pub status: ConfigVersionStatus,
    pub created_at_unix_ms: u64,
    pub message: Option<String>,
}

impl From<&ConfigVersion> for VersionResponse {
    fn from(version: &ConfigVersion) -> Self {
        Self {
            id: version.id,
            status: version.status,
            created_at_unix_ms: version.created_at_unix_ms(),
            message: version.message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitConfigResponse {
    pub version_id: u64,
}

#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub version_id: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ValidationError>,
}

impl ErrorResponse {
    pub fn message(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: Vec::new(),
            },
        }
    }

    pub fn validation(code: ApiErrorCode, details: Vec<ValidationError>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: "configuration failed validation".to_string(),
                details,
            },
        }
    }
}
