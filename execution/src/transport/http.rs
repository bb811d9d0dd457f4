//! HTTP sub-component of the Transport layer (spec §4.2): a long-lived, pooled client
//! per broker. It captures status code, upstream error code, and latency, and it never
//! retries - retry is the Router's responsibility so idempotency is enforced uniformly
//! across every adapter.

use crate::error::GatewayErrorKind;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use url::Url;

/// Per-broker HTTP client configuration (spec §6: `broker.<kind>.endpoint`,
/// `broker.<kind>.httpTimeout`).
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: Url,
    pub default_timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(base_url: Url, default_timeout: Duration) -> Self {
        Self {
            base_url,
            default_timeout,
        }
    }
}

/// A pooled HTTP client for one broker's REST surface. Cheap to clone (the underlying
/// `reqwest::Client` is itself an `Arc`-backed pool).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

/// Observed outcome of one request, before any error-kind classification.
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    pub status: u16,
    pub body: String,
    pub latency: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout)
            .build()
            .expect("reqwest client with static config never fails to build");
        Self { client, config }
    }

    /// Deadline-aware request. `deadline` is `min(caller deadline, adapter default)`
    /// per spec §4.2; the caller is responsible for computing that minimum before
    /// calling in (the transport itself only knows its own default).
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
        headers: &[(&str, String)],
        deadline: Duration,
    ) -> Result<HttpOutcome, GatewayErrorKind> {
        let url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| GatewayErrorKind::internal(format!("invalid request path {path}: {e}")))?;

        let mut builder = self.client.request(method, url).timeout(deadline);
        for (key, value) in headers {
            builder = builder.header(*key, value);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayErrorKind::transport(true, format!("failed reading response body: {e}")))?;
        let latency = started.elapsed();

        Ok(HttpOutcome {
            status,
            body: text,
            latency,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
        headers: &[(&str, String)],
        deadline: Duration,
    ) -> Result<T, GatewayErrorKind> {
        let outcome = self.request(method, path, body, headers, deadline).await?;
        classify_status(outcome.status, &outcome.body)?;
        serde_json::from_str(&outcome.body)
            .map_err(|e| GatewayErrorKind::internal(format!("failed decoding response: {e}")))
    }
}

/// Classifies an HTTP status into the unified taxonomy (spec §7): 5xx and 429 are
/// retryable transport/rate-limit errors, 401/403 is an expired/invalid session so the
/// Router can run its single refresh+retry path, any other 4xx is a broker rejection,
/// 2xx is success.
pub fn classify_status(status: u16, body: &str) -> Result<(), GatewayErrorKind> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(GatewayErrorKind::auth(format!("upstream {status}: {body}"))),
        429 => Err(GatewayErrorKind::RateLimited { retry_after: None }),
        500..=599 => Err(GatewayErrorKind::transport(true, format!("upstream 5xx: {body}"))),
        _ => Err(GatewayErrorKind::BrokerReject {
            upstream_code: status.to_string(),
            reason: body.to_string(),
        }),
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> GatewayErrorKind {
    if error.is_timeout() || error.is_connect() {
        GatewayErrorKind::transport(true, error.to_string())
    } else if error.is_builder() || error.is_request() {
        GatewayErrorKind::transport(false, error.to_string())
    } else {
        GatewayErrorKind::transport(true, error.to_string())
    }
}
