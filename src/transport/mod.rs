pub mod client;
pub mod http;

pub use client::{ApiRequest, ApiResponse, HttpMethod, Transport, TransportError};
pub use http::ReqwestTransport;
