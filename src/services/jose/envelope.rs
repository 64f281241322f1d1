//! Person-data envelope handling: compact JWE decrypt, then inner JWS
//! verification against the data-verification key set.
use josekit::jwe::ECDH_ES_A256KW;
use josekit::jwk::Jwk;
use tracing::debug;

use crate::error::FlowError;
use crate::services::jose::verify::{ClaimSet, verify_with_cache};
use crate::services::keyset::KeySetCache;

pub struct EnvelopeDecryptor {
    encryption_key: Jwk,
    data_verification_jwks_url: String,
}

impl EnvelopeDecryptor {
    pub fn new(
        encryption_key_json: &str,
        data_verification_jwks_url: impl Into<String>,
    ) -> Result<Self, FlowError> {
        let encryption_key = Jwk::from_bytes(encryption_key_json.as_bytes())
            .map_err(|e| FlowError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            encryption_key,
            data_verification_jwks_url: data_verification_jwks_url.into(),
        })
    }

    /// Decrypt a compact JWE (ECDH-ES+A256KW key wrap, AEAD content) and
    /// verify the inner compact JWS it carries.
    ///
    /// Every decryption-side failure collapses to the single opaque
    /// `DecryptionFailed`: distinguishing bad-key from bad-tag from
    /// bad-ciphertext would hand an attacker a decryption oracle. The
    /// sub-cause goes to the debug log only.
    pub async fn decrypt(
        &self,
        compact_envelope: &str,
        keysets: &KeySetCache,
    ) -> Result<ClaimSet, FlowError> {
        let decrypter = ECDH_ES_A256KW
            .decrypter_from_jwk(&self.encryption_key)
            .map_err(|e| {
                debug!(error = %e, "envelope decrypter construction failed");
                FlowError::DecryptionFailed
            })?;

        let (payload, _header) = josekit::jwe::deserialize_compact(compact_envelope, &decrypter)
            .map_err(|e| {
                debug!(error = %e, "envelope decryption failed");
                FlowError::DecryptionFailed
            })?;

        let inner_jws = String::from_utf8(payload).map_err(|_| {
            debug!("envelope payload is not utf-8");
            FlowError::DecryptionFailed
        })?;

        verify_with_cache(&inner_jws, &self.data_verification_jwks_url, keysets).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::client::{ApiRequest, ApiResponse, Transport, TransportError};
    use async_trait::async_trait;
    use std::sync::Arc;

    const DATA_JWKS: &str = include_str!("../../../tests/fixtures/data_verification_jwks.json");
    const PERSON_ENVELOPE: &str = include_str!("../../../tests/fixtures/person_encrypted.txt");

    struct JwksTransport;

    #[async_trait]
    impl Transport for JwksTransport {
        async fn request(&self, _req: ApiRequest) -> Result<ApiResponse, TransportError> {
            Ok(ApiResponse {
                status: 200,
                body: DATA_JWKS.to_string(),
            })
        }
    }

    fn decryptor_and_cache() -> (EnvelopeDecryptor, KeySetCache) {
        let config = Config::staging();
        let decryptor =
            EnvelopeDecryptor::new(&config.private_key_enc, &config.data_verification_jwks_url)
                .unwrap();
        let cache = KeySetCache::new(Arc::new(JwksTransport), 3600);
        (decryptor, cache)
    }

    #[tokio::test]
    async fn decrypts_published_staging_envelope() {
        let (decryptor, cache) = decryptor_and_cache();

        let claims = decryptor
            .decrypt(PERSON_ENVELOPE.trim(), &cache)
            .await
            .unwrap();

        let expected: serde_json::Value = serde_json::from_str(include_str!(
            "../../../tests/fixtures/person_decrypted.json"
        ))
        .unwrap();
        assert_eq!(serde_json::Value::Object(claims), expected);
    }

    #[tokio::test]
    async fn flipped_ciphertext_byte_is_opaque_failure() {
        let (decryptor, cache) = decryptor_and_cache();

        // Flip a byte in the ciphertext segment (4th of 5).
        let mut parts: Vec<String> = PERSON_ENVELOPE.trim().split('.').map(str::to_string).collect();
        assert_eq!(parts.len(), 5);
        let mut bytes = parts[3].clone().into_bytes();
        bytes[100] = if bytes[100] == b'A' { b'B' } else { b'A' };
        parts[3] = String::from_utf8(bytes).unwrap();

        let err = decryptor
            .decrypt(&parts.join("."), &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::DecryptionFailed));
    }

    #[tokio::test]
    async fn flipped_tag_byte_is_opaque_failure() {
        let (decryptor, cache) = decryptor_and_cache();

        let mut parts: Vec<String> = PERSON_ENVELOPE.trim().split('.').map(str::to_string).collect();
        let mut bytes = parts[4].clone().into_bytes();
        bytes[5] = if bytes[5] == b'A' { b'B' } else { b'A' };
        parts[4] = String::from_utf8(bytes).unwrap();

        let err = decryptor
            .decrypt(&parts.join("."), &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::DecryptionFailed));
    }

    #[tokio::test]
    async fn non_envelope_input_is_opaque_failure() {
        let (decryptor, cache) = decryptor_and_cache();

        let err = decryptor.decrypt("a.b.c", &cache).await.unwrap_err();
        assert!(matches!(err, FlowError::DecryptionFailed));
    }
}
