/*
 * Responsibility
 * - Module wiring + public surface of the MyInfo v4 retrieval client
 * - Core pipeline: client assertion -> DPoP token exchange -> person fetch -> JWE decrypt
 */
pub mod config;
pub mod error;
pub mod flow;
pub mod services;
pub mod transport;

pub use config::Config;
pub use error::FlowError;
pub use flow::{FlowOrchestrator, InitiatedFlow};
