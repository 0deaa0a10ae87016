//! reqwest-backed transport with certificate pinning.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::TimeoutConfig;
use crate::http::response::TransportResponse;
use crate::net::tls::{pinned_client_config, VerifierError};
use crate::net::transport::{OutboundRequest, Transport, TransportError};
use crate::security::pinning::PinnedKey;

/// Error building the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error(transparent)]
    Tls(#[from] VerifierError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Production transport: reqwest over rustls with a pinning verifier.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client that pins `pins` and applies `timeouts`.
    pub fn new(pins: Vec<PinnedKey>, timeouts: &TimeoutConfig) -> Result<Self, ClientBuildError> {
        let tls = pinned_client_config(pins)?;
        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()?;

        tracing::debug!(
            connect_timeout_secs = timeouts.connect_secs,
            request_timeout_secs = timeouts.request_secs,
            "HTTP client initialized"
        );

        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let client = self.client.clone();
        async move {
            let mut builder = client
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(map_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?;

            Ok(TransportResponse::new(status, headers, body))
        }
        .boxed()
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidUrl(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
