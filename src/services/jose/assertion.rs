//! Client-authentication assertion (private_key_jwt with a `cnf.jkt`
//! binding to the session's ephemeral DPoP key).
use std::sync::Arc;

use josekit::jwk::Jwk;
use josekit::jws::{ES256, JwsHeader};
use josekit::jwt::{self, JwtPayload};
use serde_json::{Map, Value, json};

use crate::error::FlowError;
use crate::services::jose::keypair::ec_thumbprint;
use crate::services::jose::{Clock, generate_jti};

// MyInfo caps client assertions at 5 minutes.
const ASSERTION_TTL_SECONDS: i64 = 300;

/// Builds the signed client-authentication JWT presented at the token
/// endpoint. Always signs with the static client key, never the ephemeral
/// session key; the ephemeral key enters only as the `cnf.jkt` thumbprint.
pub struct AssertionSigner {
    client_id: String,
    signing_key: Jwk,
    // kid header: thumbprint of the static signing key itself.
    kid: String,
    clock: Arc<dyn Clock>,
}

impl AssertionSigner {
    pub fn new(
        client_id: impl Into<String>,
        signing_key_json: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FlowError> {
        let signing_key = Jwk::from_bytes(signing_key_json.as_bytes())
            .map_err(|e| FlowError::KeyGeneration(e.to_string()))?;
        let kid = ec_thumbprint(&signing_key)?;

        Ok(Self {
            client_id: client_id.into(),
            signing_key,
            kid,
            clock,
        })
    }

    /// Compact ES256 JWS over the assertion claims. Single-use: a fresh
    /// `jti` is drawn per call and `exp` is always `iat + 300`.
    pub fn build(&self, token_endpoint_url: &str, jkt_thumbprint: &str) -> Result<String, FlowError> {
        let now = self.clock.now_unix();

        let mut claims = Map::new();
        claims.insert("sub".into(), Value::from(self.client_id.as_str()));
        claims.insert("jti".into(), Value::from(generate_jti()?));
        claims.insert("aud".into(), Value::from(token_endpoint_url));
        claims.insert("iss".into(), Value::from(self.client_id.as_str()));
        claims.insert("iat".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now + ASSERTION_TTL_SECONDS));
        // jkt thumbprint must match the DPoP JWK used in the same request.
        claims.insert("cnf".into(), json!({ "jkt": jkt_thumbprint }));

        let payload =
            JwtPayload::from_map(claims).map_err(|e| FlowError::Signing(e.to_string()))?;

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        header.set_key_id(&self.kid);

        let signer = ES256
            .signer_from_jwk(&self.signing_key)
            .map_err(|e| FlowError::Signing(e.to_string()))?;

        jwt::encode_with_signer(&payload, &header, &signer)
            .map_err(|e| FlowError::Signing(e.to_string()))
    }
}
