use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::supervisor::{ApplyAndReloadError, SupervisorState};

use super::auth::{authorize, AuthConfig, Role};
use super::client::SupervisorClient;
use super::dto::{HealthResponse, RollbackResponse, StatusResponse, SubmitConfigResponse, VersionResponse};
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

/// Unauthenticated liveness probe: 200 iff the supervisor is in a phase
/// that can serve traffic (`running` or `reloading`).
pub async fn get_health(client: web::Data<SupervisorClient>) -> Result<HttpResponse, ApiError> {
    let status = client.status()?;
    let healthy = matches!(status.state, SupervisorState::Running | SupervisorState::Reloading);
    let body = HealthResponse { healthy, state: status.state };
    if healthy {
        Ok(HttpResponse::Ok().json(body))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(body))
    }
}

pub async fn get_status(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Viewer)?;
    let status = client.status()?;
    Ok(HttpResponse::Ok().json(StatusResponse::from(status)))
}

/// `POST /config`: validates `body`, submits it as a new version, and
/// activates it through a blue-green reload in a single round trip, per
/// the Control API's validate+apply+reload contract.
pub async fn submit_config(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Admin)?;
    match client.apply_and_reload(body.to_vec())? {
        Ok(version_id) => Ok(HttpResponse::Accepted().json(SubmitConfigResponse { version_id })),
        Err(ApplyAndReloadError::Validation(errors)) => Err(ApiError::Validation(errors)),
        Err(ApplyAndReloadError::ReloadFailed(reason)) => Err(ApiError::ReloadFailed(reason)),
    }
}

pub async fn activate_version(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Operator)?;
    let id = path.into_inner();
    match client.activate(id)? {
        Ok(()) => Ok(HttpResponse::Ok().finish()),
        Err(reason) => Err(ApiError::ReloadFailed(reason)),
    }
}

pub async fn reload_current(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Operator)?;
    let status = client.status()?;
    let Some(current) = status.current_version else {
        return Err(ApiError::NotFound("no active configuration to reload".to_string()));
    };
    match client.activate(current)? {
        Ok(()) => Ok(HttpResponse::Ok().finish()),
        Err(reason) => Err(ApiError::ReloadFailed(reason)),
    }
}

pub async fn rollback(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Admin)?;
    match client.rollback()? {
        Ok(version_id) => Ok(HttpResponse::Ok().json(RollbackResponse { version_id })),
        Err(reason) => Err(ApiError::ReloadFailed(reason)),
    }
}

/// `GET /config/history?limit=N`: recent versions, newest first, capped to
/// `limit` when given.
pub async fn list_versions(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Viewer)?;
    let versions = client.list_versions(query.limit)?;
    let body: Vec<VersionResponse> = versions.iter().map(VersionResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// `GET /config/current`: metadata for the active version, if any.
pub async fn get_current_version(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Viewer)?;
    let status = client.status()?;
    let Some(current_id) = status.current_version else {
        return Err(ApiError::NotFound("no active configuration".to_string()));
    };
    match client.get_version(current_id)? {
        Some(version) => Ok(HttpResponse::Ok().json(VersionResponse::from(&version))),
        None => Err(ApiError::NotFound(format!("no version with id {current_id}"))),
    }
}

pub async fn get_version(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Viewer)?;
    let id = path.into_inner();
    match client.get_version(id)? {
        Some(version) => Ok(HttpResponse::Ok().json(VersionResponse::from(&version))),
        None => Err(ApiError::NotFound(format!("no version with id {id}"))),
    }
}

/// Prometheus-style exposition of the internal counters surfaced in
/// `SupervisorStatus`: consecutive reload/health failures so far. The
/// cardinality limiter's own drop/aggregate/evict counters are exposed by
/// whichever pipeline stage owns the limiter instance, not by this crate
/// directly, since the limiter is embedded per-pipeline rather than
/// process-global.
pub async fn get_metrics(
    req: HttpRequest,
    client: web::Data<SupervisorClient>,
    auth: web::Data<AuthConfig>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &auth, Role::Viewer)?;
    let status = client.status()?;
    let mut body = String::new();
    body.push_str("# HELP nrdot_supervisor_state Current supervisor phase (0=starting,1=running,2=reloading,3=degraded,4=stopped)\n");
    body.push_str("# TYPE nrdot_supervisor_state gauge\n");
    body.push_str(&format!("nrdot_supervisor_state {}\n", state_as_gauge(status.state)));
    body.push_str("# HELP nrdot_consecutive_failures Consecutive reload/health failures observed by the crash-loop tracker\n");
    body.push_str("# TYPE nrdot_consecutive_failures gauge\n");
    body.push_str(&format!("nrdot_consecutive_failures {}\n", status.consecutive_failures));
    Ok(HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(body))
}

fn state_as_gauge(state: SupervisorState) -> u8 {
    match state {
        SupervisorState::Starting => 0,
        SupervisorState::Running => 1,
        SupervisorState::Reloading => 2,
        SupervisorState::Degraded => 3,
        SupervisorState::Stopped => 4,
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};
    use crossbeam::channel::unbounded;

    use crate::config::{ValidationError, ValidationErrorCode};
    use crate::supervisor::commands::Command;

    use super::*;

    fn auth() -> AuthConfig {
        AuthConfig::new()
            .with_token("admin-token", Role::Admin)
            .with_token("viewer-token", Role::Viewer)
    }

    /// Answers exactly one `Status` command with a fixed snapshot, then exits.
    fn respond_once_to_status(state: SupervisorState) -> SupervisorClient {
        let (tx, rx) = unbounded::<Command>();
        std::thread::spawn(move || {
            if let Ok(Command::Status { reply }) = rx.recv() {
                let _ = reply.send(SupervisorStatus {
                    state,
                    current_version: Some(1),
                    collector_pid: Some(4242),
                    consecutive_failures: 0,
                });
            }
        });
        SupervisorClient::new(tx)
    }

    /// Answers exactly one `ApplyAndReload` command with a validation failure.
    fn respond_once_to_submit_with_validation_error() -> SupervisorClient {
        let (tx, rx) = unbounded::<Command>();
        std::thread::spawn(move || {
            if let Ok(Command::ApplyAndReload { reply, .. }) = rx.recv() {
                let _ = reply.send(Err(crate::supervisor::ApplyAndReloadError::Validation(vec![
                    ValidationError::new(
                        "license_key",
                        ValidationErrorCode::MissingRequired,
                        "license_key is required",
                    ),
                ])));
            }
        });
        SupervisorClient::new(tx)
    }

    #[actix_web::test]
    async fn status_without_a_bearer_token_is_unauthorized() {
        let client = respond_once_to_status(SupervisorState::Running);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(client))
                .app_data(web::Data::new(auth()))
                .route("/status", web::get().to(get_status)),
        )
        .await;

        let req = test::TestRequest::get().uri("/status").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[actix_web::test]
    async fn submit_config_with_a_viewer_token_is_forbidden() {
        let client = respond_once_to_submit_with_validation_error();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(client))
                .app_data(web::Data::new(auth()))
                .route("/config", web::post().to(submit_config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/config")
            .insert_header(("Authorization", "Bearer viewer-token"))
            .set_payload("exporters: {}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[actix_web::test]
    async fn submit_config_validation_failure_surfaces_code_and_details() {
        let client = respond_once_to_submit_with_validation_error();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(client))
                .app_data(web::Data::new(auth()))
                .route("/config", web::post().to(submit_config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/config")
            .insert_header(("Authorization", "Bearer admin-token"))
            .set_payload("exporters: {}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(body["error"]["details"][0]["path"], "license_key");
    }

    #[actix_web::test]
    async fn health_is_reachable_without_a_bearer_token() {
        let client = respond_once_to_status(SupervisorState::Running);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(client))
                .route("/health", web::get().to(get_health)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn health_reports_503_while_degraded() {
        let client = respond_once_to_status(SupervisorState::Degraded);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(client))
                .route("/health", web::get().to(get_health)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
