//! Collector health probing over HTTP.
//!
//! `HttpClient` is a seam purely for testing: production code always goes
//! through `BlockingHttpClient`, tests substitute a `mockall` double so they
//! never open a real socket.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("request error: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error(transparent)]
    Client(#[from] HttpClientError),
    #[error("unhealthy status code: {0}")]
    UnhealthyStatusCode(u16),
}

#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    fn get(&self, path: &str) -> Result<u16, HttpClientError>;
}

pub trait HealthChecker: Send + Sync {
    fn check_health(&self) -> Result<(), HealthCheckError>;
}

/// Probes a path on the collector's admin address, treating any `2xx` as
/// healthy. Production wiring always points this at `/health`, per the
/// child collector contract; the path is a constructor argument purely so
/// tests can exercise the checker without standing up a real endpoint.
pub struct HttpHealthChecker<C: HttpClient> {
    client: C,
    path: String,
}

impl<C: HttpClient> HttpHealthChecker<C> {
    pub fn new(client: C, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl<C: HttpClient> HealthChecker for HttpHealthChecker<C> {
    fn check_health(&self) -> Result<(), HealthCheckError> {
        let status = self.client.get(&self.path)?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(HealthCheckError::UnhealthyStatusCode(status))
        }
    }
}

/// Default interval between liveness probes once a collector process has
/// finished starting up.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Talks to a real `http://<host>/<path>` endpoint with a short timeout;
/// the process manager's health-check loop already retries, so a single
/// request here never needs to wait long.
pub struct BlockingHttpClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl BlockingHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .expect("building the health-check HTTP client must not fail"),
        }
    }
}

impl HttpClient for BlockingHttpClient {
    fn get(&self, path: &str) -> Result<u16, HttpClientError> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .get(&url)
            .send()
            .map(|response| response.status().as_u16())
            .map_err(|err| HttpClientError::Request(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hundred_is_healthy() {
        let mut client = MockHttpClient::new();
        client.expect_get().returning(|_| Ok(200));
        let checker = HttpHealthChecker::new(client, "/healthz");
        assert!(checker.check_health().is_ok());
    }

    #[test]
    fn five_hundred_is_unhealthy() {
        let mut client = MockHttpClient::new();
        client.expect_get().returning(|_| Ok(503));
        let checker = HttpHealthChecker::new(client, "/healthz");
        assert!(matches!(
            checker.check_health(),
            Err(HealthCheckError::UnhealthyStatusCode(503))
        ));
    }

    #[test]
    fn client_error_propagates() {
        let mut client = MockHttpClient::new();
        client
            .expect_get()
            .returning(|_| Err(HttpClientError::Request("connection refused".into())));
        let checker = HttpHealthChecker::new(client, "/healthz");
        assert!(matches!(checker.check_health(), Err(HealthCheckError::Client(_))));
    }
}
