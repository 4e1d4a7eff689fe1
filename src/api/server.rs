//! Runs the Control API's HTTP server on its own thread and hands the
//! caller a handle to stop it.
//!
//! Grounded in `http_server::server::run_status_server`: the server build
//! and bind happen on a dedicated thread, and the `ServerHandle` needed for
//! graceful shutdown is sent back to the caller over a one-shot channel so
//! a bind failure surfaces as an `Err` instead of a thread panic.

use std::sync::mpsc;

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use thiserror::Error;
use tracing::info;

use super::auth::AuthConfig;
use super::client::SupervisorClient;
use super::config::ServerConfig;
use super::handlers;

#[derive(Debug, Error)]
pub enum ApiServerError {
    #[error("failed to bind control API to {0}: {1}")]
    Bind(String, String),
    #[error("control API server thread panicked before it could start")]
    StartupChannelClosed,
}

pub struct RunningApiServer {
    handle: ServerHandle,
    join_handle: std::thread::JoinHandle<()>,
}

impl RunningApiServer {
    pub fn stop(self) {
        self.handle.stop(true);
        let _ = self.join_handle.join();
    }
}

pub fn run(
    config: ServerConfig,
    client: SupervisorClient,
    auth: AuthConfig,
) -> Result<RunningApiServer, ApiServerError> {
    let (startup_tx, startup_rx) = mpsc::channel::<Result<ServerHandle, String>>();
    let bind_address = config.bind_address();
    let workers = config.workers;

    let join_handle = std::thread::Builder::new()
        .name("control-api".to_string())
        .spawn(move || {
            let system = actix_web::rt::System::new();
            let result = system.block_on(async {
                let client = web::Data::new(client);
                let auth = web::Data::new(auth);
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(client.clone())
                        .app_data(auth.clone())
                        .route("/health", web::get().to(handlers::get_health))
                        .route("/status", web::get().to(handlers::get_status))
                        .route("/metrics", web::get().to(handlers::get_metrics))
                        .route("/config", web::post().to(handlers::submit_config))
                        .route("/config/current", web::get().to(handlers::get_current_version))
                        .route("/config/history", web::get().to(handlers::list_versions))
                        .route("/config/versions", web::get().to(handlers::list_versions))
                        .route("/config/versions/{id}", web::get().to(handlers::get_version))
                        .route("/config/versions/{id}/activate", web::post().to(handlers::activate_version))
                        .route("/reload", web::post().to(handlers::reload_current))
                        .route("/rollback", web::post().to(handlers::rollback))
                        .route("/config/rollback", web::post().to(handlers::rollback))
                })
                .workers(workers)
                .bind(&bind_address);

                match server {
                    Ok(server) => {
                        let server = server.run();
                        let handle = server.handle();
                        let _ = startup_tx.send(Ok(handle));
                        server.await
                    }
                    Err(err) => {
                        let _ = startup_tx.send(Err(err.to_string()));
                        Ok(())
                    }
                }
            });
            if let Err(err) = result {
                tracing::error!(error = %err, "control API server task ended with an error");
            }
        })
        .expect("failed to spawn control-api thread");

    match startup_rx.recv() {
        Ok(Ok(handle)) => {
            info!(address = %bind_address, "control API listening");
            Ok(RunningApiServer { handle, join_handle })
        }
        Ok(Err(bind_err)) => {
            let _ = join_handle.join();
            Err(ApiServerError::Bind(bind_address, bind_err))
        }
        Err(_) => Err(ApiServerError::StartupChannelClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn server_binds_and_stops_cleanly() {
        let (tx, _rx) = unbounded();
        let client = SupervisorClient::new(tx);
        let config = ServerConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: 1,
        };

        let server = run(config, client, AuthConfig::new()).expect("server should bind to an ephemeral port");
        server.stop();
    }

    #[test]
    fn bind_failure_on_an_occupied_port_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, _rx) = unbounded();
        let client = SupervisorClient::new(tx);
        let config = ServerConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port,
            workers: 1,
        };

        let result = run(config, client, AuthConfig::new());
        assert!(matches!(result, Err(ApiServerError::Bind(_, _))));
        drop(listener);
    }
}
