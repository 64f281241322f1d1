//! reqwest-backed production transport.
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use crate::transport::client::{ApiRequest, ApiResponse, HttpMethod, Transport, TransportError};

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// `cert_verify = false` is for the MyInfo staging environment only.
    pub fn new(timeout_seconds: u64, cert_verify: bool) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .danger_accept_invalid_certs(!cert_verify)
            .build()
            .map_err(|e| TransportError::Connection {
                url: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = req.url.clone();

        let mut builder = match req.method {
            HttpMethod::Get => self.client.get(&req.url),
            HttpMethod::Post => self.client.post(&req.url),
        };

        builder = builder.header("Accept", "application/json");
        for (name, value) in &req.headers {
            builder = builder.header(*name, value);
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if req.method == HttpMethod::Post {
            builder = builder.form(&req.form);
        }

        let response = builder.send().await.map_err(|e| TransportError::Connection {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError::Connection {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !(200..300).contains(&status) {
            // Keep the body: the remote error detail is the only diagnostic.
            error!(url = %url, status, body = %body, "api request failed");
            return Err(TransportError::Status { url, status, body });
        }

        Ok(ApiResponse { status, body })
    }
}
