//! Compact JWS verification against a remote key set.
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use tracing::warn;

use crate::error::FlowError;
use crate::services::keyset::{KeySet, KeySetCache};

/// Verified claims of a compact token, as-is. Expiry is deliberately not
/// enforced at this layer; the orchestrator applies its own window.
pub type ClaimSet = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    /// No candidate key in the set validates the signature.
    #[error("token signature invalid")]
    SignatureInvalid,
    /// The compact structure itself cannot be parsed.
    #[error("malformed compact token")]
    MalformedToken,
    /// Signature checks out but the payload is not a JSON object.
    #[error("verified payload is not valid structured data")]
    ClaimDecode,
}

/// Verify `token` against `keyset`: the key matching the header `kid` is
/// tried first, then every remaining signature key.
pub fn verify(token: &str, keyset: &KeySet) -> Result<ClaimSet, VerifyError> {
    let header = decode_header(token).map_err(|_| VerifyError::MalformedToken)?;

    let mut candidates: Vec<&Jwk> = Vec::new();
    if let Some(kid) = header.kid.as_deref() {
        if let Some(jwk) = keyset.find(kid) {
            candidates.push(jwk);
        }
    }
    for jwk in keyset.signature_keys() {
        if !candidates.iter().any(|c| std::ptr::eq(*c, jwk)) {
            candidates.push(jwk);
        }
    }

    for jwk in candidates {
        let alg = match &jwk.algorithm {
            AlgorithmParameters::EllipticCurve(params) if params.curve == EllipticCurve::P256 => {
                Algorithm::ES256
            }
            AlgorithmParameters::RSA(_) => Algorithm::RS256,
            _ => continue,
        };
        if alg != header.alg {
            continue;
        }

        let Ok(key) = DecodingKey::from_jwk(jwk) else {
            continue;
        };

        // Signature only: exp/nbf enforcement is the caller's concern.
        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        match decode::<ClaimSet>(token, &key, &validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => match e.kind() {
                // Signature verified, payload is not a JSON object.
                ErrorKind::Json(_) => return Err(VerifyError::ClaimDecode),
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                    return Err(VerifyError::MalformedToken);
                }
                // Wrong key: keep trying the rest of the set.
                _ => continue,
            },
        }
    }

    Err(VerifyError::SignatureInvalid)
}

/// Verify against the cached key set for `url`. An unmatched `kid` forces
/// exactly one refetch (rotation window) before failing permanently.
pub async fn verify_with_cache(
    token: &str,
    url: &str,
    cache: &KeySetCache,
) -> Result<ClaimSet, FlowError> {
    let header = decode_header(token).map_err(|_| VerifyError::MalformedToken)?;

    let mut keyset = cache.fetch(url).await?;
    if let Some(kid) = header.kid.as_deref() {
        if keyset.find(kid).is_none() {
            warn!(url = %url, kid = %kid, "kid not in cached key set, forcing refetch");
            keyset = cache.refresh(url).await?;
        }
    }

    verify(token, &keyset).map_err(|e| {
        warn!(url = %url, error = %e, "token verification failed");
        FlowError::from(e)
    })
}
