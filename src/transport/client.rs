//! Outbound HTTP interface used by the flow (token exchange, person fetch,
//! JWKS retrieval).
use async_trait::async_trait;
use thiserror::Error;

/// Transport-layer errors. Non-2xx responses are errors here: every call in
/// the flow requires success, and retrying needs fresh short-lived proofs.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("{url} answered status {status}")]
    Status { url: String, status: u16, body: String },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Connection { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } => Some(body),
            TransportError::Connection { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Wire form, also used verbatim as the DPoP `htm` claim.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub query: Vec<(&'static str, String)>,
    // x-www-form-urlencoded body, POST only.
    pub form: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal outbound HTTP seam.
///
/// Implementations apply a bounded timeout and the TLS-verify policy
/// themselves; callers never retry (short-lived proofs would be stale).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, TransportError>;
}
