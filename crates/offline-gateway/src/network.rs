//! # Network
//!
//! The real network behind an async trait, so retrieval strategies can run
//! against any transport. [`HttpNetwork`] is the reqwest-backed implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use rustls::{ClientConfig, crypto::aws_lc_rs};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::debug;
use url::Url;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::{GatewayConfig, GatewayError};

/// A fully buffered network response
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    /// Final URL after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl NetworkResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A transport able to GET a URL
#[async_trait]
pub trait Network: Send + Sync {
    /// Fetch `url`, returning any response the origin produced.
    ///
    /// Non-2xx answers are responses, not errors; only transport failures
    /// are reported as `Err`.
    async fn fetch(&self, url: &Url) -> Result<NetworkResponse, GatewayError>;
}

/// Fetch through `network`, treating expiry of `timeout` as a failure
pub async fn fetch_with_timeout(
    network: &dyn Network,
    url: &Url,
    timeout: Duration,
) -> Result<NetworkResponse, GatewayError> {
    let timeout = if timeout.is_zero() {
        DEFAULT_REQUEST_TIMEOUT
    } else {
        timeout
    };

    match tokio::time::timeout(timeout, network.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &GatewayConfig) -> Result<Client, GatewayError> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::TlsError(e.to_string()))?
        .with_platform_verifier()
        .map_err(|e| GatewayError::TlsError(e.to_string()))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.request_timeout.is_zero() {
        client_builder = client_builder.timeout(config.request_timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(GatewayError::from)
}

/// Network implementation over a reqwest client
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(create_client(config)?))
    }
}

/// A connection that could not be established means the origin is unreachable
fn transport_error(url: &Url, e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        debug!(url = %url, error = %e, "Connection failed");
        GatewayError::Offline(url.to_string())
    } else {
        GatewayError::HttpError(e)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, url: &Url) -> Result<NetworkResponse, GatewayError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body = response.bytes().await?;

        debug!(url = %url, final_url = %final_url, status = %status, size = body.len(), "Network fetch completed");

        Ok(NetworkResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNetwork;

    #[tokio::test]
    async fn test_refused_connection_is_offline() {
        // Bind then drop to find a local port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/app.js")).unwrap();
        let _ = aws_lc_rs::default_provider().install_default();
        let network = HttpNetwork::new(Client::builder().build().unwrap());

        let err = network.fetch(&url).await.unwrap_err();
        assert!(matches!(err, GatewayError::Offline(ref u) if u == url.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_still_bounded() {
        let network = FakeNetwork::new();
        let url = Url::parse("https://app.example.com/slow").unwrap();
        network.stall(&url);

        let err = fetch_with_timeout(&network, &url, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Timeout { timeout, .. } if timeout == DEFAULT_REQUEST_TIMEOUT
        ));
    }
}
