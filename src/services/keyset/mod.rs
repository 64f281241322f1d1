//! Remote JWKS model and per-URL cache.
pub mod cache;

pub use cache::KeySetCache;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, PublicKeyUse};
use serde::Deserialize;
use tracing::debug;

use crate::error::FlowError;

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// A parsed remote key set.
///
/// Parsing is lenient per key: entries the verifier cannot use (unknown
/// algorithms, encryption-only formats) are skipped so a provider adding key
/// types does not break verification. A document that is not a JWKS at all
/// is fatal to the calling operation.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<Jwk>,
}

impl KeySet {
    pub fn parse(body: &str) -> Result<Self, FlowError> {
        let raw: RawKeySet = serde_json::from_str(body).map_err(|_| FlowError::MalformedKeySet)?;

        let mut keys = Vec::with_capacity(raw.keys.len());
        for value in raw.keys {
            match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) => keys.push(jwk),
                Err(e) => debug!(error = %e, "skipping unusable jwk in key set"),
            }
        }
        Ok(Self { keys })
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.common.key_id.as_deref() == Some(kid))
    }

    /// Keys usable for signature verification, in document order.
    pub fn signature_keys(&self) -> impl Iterator<Item = &Jwk> {
        self.keys.iter().filter(|k| {
            !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption))
                && matches!(
                    k.algorithm,
                    AlgorithmParameters::EllipticCurve(_) | AlgorithmParameters::RSA(_)
                )
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGING_JWKS: &str = include_str!("../../../tests/fixtures/token_verification_jwks.json");

    #[test]
    fn parses_published_staging_document() {
        let keyset = KeySet::parse(STAGING_JWKS).unwrap();
        // RSA + EC signature keys survive; the ECDH-ES encryption key may be
        // skipped by the lenient parser but must never be offered for
        // signature verification.
        assert!(keyset.signature_keys().count() >= 2);
        assert!(keyset.find("AFMnnKRWTaBYEhNfEB6iQ5ErC1yqGVyZchH8A7nl_yM").is_some());
    }

    #[test]
    fn non_jwks_document_is_fatal() {
        assert!(matches!(
            KeySet::parse("not json"),
            Err(FlowError::MalformedKeySet)
        ));
        assert!(matches!(
            KeySet::parse(r#"{"no_keys": []}"#),
            Err(FlowError::MalformedKeySet)
        ));
    }

    #[test]
    fn unknown_kid_is_absent() {
        let keyset = KeySet::parse(STAGING_JWKS).unwrap();
        assert!(keyset.find("no-such-kid").is_none());
    }
}
