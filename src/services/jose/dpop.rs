//! DPoP proof generation (RFC 9449, client side).
//!
//! The proof embeds the ephemeral public key itself; the remote party checks
//! that its thumbprint equals the `cnf.jkt` bound into the access token. A
//! mismatch is rejected remotely, never detected here.
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use josekit::jws::{ES256, JwsHeader};
use josekit::jwt::{self, JwtPayload};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::FlowError;
use crate::services::jose::keypair::EphemeralKeypair;
use crate::services::jose::{Clock, generate_jti};
use crate::transport::client::HttpMethod;

// MyInfo caps DPoP proofs at 2 minutes.
const PROOF_TTL_SECONDS: i64 = 120;

pub struct DpopProver {
    clock: Arc<dyn Clock>,
}

impl DpopProver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Compact ES256 JWS proof for one HTTP request. `htu`/`htm` must equal
    /// the request actually sent. `ath` is attached only for resource calls,
    /// as `base64url(sha256(access_token))`.
    pub fn build(
        &self,
        url: &str,
        keypair: &EphemeralKeypair,
        method: HttpMethod,
        access_token: Option<&str>,
    ) -> Result<String, FlowError> {
        let now = self.clock.now_unix();

        let mut claims = Map::new();
        claims.insert("htu".into(), Value::from(url));
        claims.insert("htm".into(), Value::from(method.as_str()));
        claims.insert("jti".into(), Value::from(generate_jti()?));
        claims.insert("iat".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now + PROOF_TTL_SECONDS));
        if let Some(token) = access_token {
            claims.insert("ath".into(), Value::from(compute_ath(token)));
        }

        let payload =
            JwtPayload::from_map(claims).map_err(|e| FlowError::Signing(e.to_string()))?;

        let mut header = JwsHeader::new();
        header.set_token_type("dpop+jwt");
        header.set_jwk(keypair.public_jwk()?);

        let signer = ES256
            .signer_from_jwk(keypair.private_jwk())
            .map_err(|e| FlowError::Signing(e.to_string()))?;

        jwt::encode_with_signer(&payload, &header, &signer)
            .map_err(|e| FlowError::Signing(e.to_string()))
    }
}

/// Access-token hash claim: base64url(SHA-256(access_token)), no padding.
pub fn compute_ath(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    const SAMPLE_EPHEMERAL: &str = r#"{"alg":"ES256","crv":"P-256","d":"-8hBIRHZNsjhM0VLmpvUXnmFJGjwk9D54A292wZIHKc","kty":"EC","use":"sig","x":"hzP7o6QSUsqoEG1_ia7uXKWUxMnLZyDsc_Q_58vX9Gg","y":"UNTaMkOSmhCcZdVbClmKNOYD3i8LJ3yYMNjFCyV8zOk"}"#;

    fn decode_segment(token: &str, index: usize) -> serde_json::Value {
        let segment = token.split('.').nth(index).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[test]
    fn proof_matches_reference_shape() {
        let keypair = EphemeralKeypair::from_private_json(SAMPLE_EPHEMERAL).unwrap();
        let prover = DpopProver::new(Arc::new(FixedClock(1710202991)));

        let proof = prover
            .build(
                "https://test.api.myinfo.gov.sg/com/v4/token",
                &keypair,
                HttpMethod::Post,
                None,
            )
            .unwrap();

        let header = decode_segment(&proof, 0);
        assert_eq!(header["typ"], "dpop+jwt");
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["kty"], "EC");
        assert_eq!(header["jwk"]["crv"], "P-256");
        assert_eq!(header["jwk"]["use"], "sig");
        assert_eq!(header["jwk"]["x"], "hzP7o6QSUsqoEG1_ia7uXKWUxMnLZyDsc_Q_58vX9Gg");
        assert_eq!(header["jwk"]["y"], "UNTaMkOSmhCcZdVbClmKNOYD3i8LJ3yYMNjFCyV8zOk");
        // Embedded key thumbprint == keypair thumbprint (cnf.jkt binding).
        assert_eq!(header["jwk"]["kid"], keypair.thumbprint());
        assert!(header["jwk"].get("d").is_none());

        let claims = decode_segment(&proof, 1);
        assert_eq!(claims["htu"], "https://test.api.myinfo.gov.sg/com/v4/token");
        assert_eq!(claims["htm"], "POST");
        assert_eq!(claims["iat"], 1710202991);
        assert_eq!(claims["exp"], 1710202991 + 120);
        assert!(claims.get("ath").is_none());
    }

    #[test]
    fn ath_present_iff_access_token_supplied() {
        let keypair = EphemeralKeypair::from_private_json(SAMPLE_EPHEMERAL).unwrap();
        let prover = DpopProver::new(Arc::new(FixedClock(1710202991)));

        let proof = prover
            .build(
                "https://test.api.myinfo.gov.sg/com/v4/person/sub/",
                &keypair,
                HttpMethod::Get,
                Some("token-value"),
            )
            .unwrap();

        let claims = decode_segment(&proof, 1);
        assert_eq!(claims["htm"], "GET");
        assert_eq!(claims["ath"], compute_ath("token-value"));
    }

    #[test]
    fn ath_is_urlsafe_sha256_of_token() {
        // sha256("test") = n4bQgYhMfWWaL-qgxVrQFaO_TxsrC4Is0V1sFbDwCgg
        assert_eq!(compute_ath("test"), "n4bQgYhMfWWaL-qgxVrQFaO_TxsrC4Is0V1sFbDwCgg");
    }

    #[test]
    fn jti_changes_per_proof() {
        let keypair = EphemeralKeypair::from_private_json(SAMPLE_EPHEMERAL).unwrap();
        let prover = DpopProver::new(Arc::new(FixedClock(1710202991)));

        let a = prover
            .build("https://example.test/token", &keypair, HttpMethod::Post, None)
            .unwrap();
        let b = prover
            .build("https://example.test/token", &keypair, HttpMethod::Post, None)
            .unwrap();
        assert_ne!(decode_segment(&a, 1)["jti"], decode_segment(&b, 1)["jti"]);
    }
}
