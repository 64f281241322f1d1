//! JOSE pipeline: ephemeral keys, client assertions, DPoP proofs, compact
//! JWS verification and JWE envelope decryption.
pub mod assertion;
pub mod dpop;
pub mod envelope;
pub mod keypair;
pub mod verify;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::FlowError;

/// Injectable time source so token `iat`/`exp` are deterministic in tests.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fresh random `jti`: 32 bytes of entropy, URL-safe base64 without padding.
/// Unique per assertion/proof; never reused across request attempts.
pub fn generate_jti() -> Result<String, FlowError> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| FlowError::KeyGeneration(e.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
