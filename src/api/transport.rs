// src/api/transport.rs
//! The HTTP seam. Production code talks to upstreams through `ReqwestTransport`;
//! tests swap in a scripted transport.

use super::client::redact_url;
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(DashboardError::from)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issues a GET. Non-2xx statuses are returned as responses; only
    /// transport failures are errors.
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("token-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("GET {} -> {} ({} bytes)", redact_url(url), status, body.len());
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_errors_do_not_carry_query_string() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        // rejected before any connection is attempted
        let err = transport
            .get("ftp://sheets.test/v4/spreadsheets/s/values/A1?key=SECRET123", &[])
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, DashboardError::NetworkError(_)), "{:?}", err);
        assert!(!message.contains("SECRET123"), "{}", message);
        assert!(message.contains("sheets.test/v4/spreadsheets/s/values/A1"), "{}", message);
    }
}
