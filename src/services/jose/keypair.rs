//! Per-flow ephemeral P-256 signing keypairs and RFC 7638 thumbprints.
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use josekit::jwk::Jwk;
use josekit::jwk::alg::ec::EcCurve;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::FlowError;

/// Ephemeral session keypair. Exclusively owned by one flow: generated at
/// token exchange, used for both DPoP proofs, then discarded.
#[derive(Clone)]
pub struct EphemeralKeypair {
    jwk: Jwk,
    thumbprint: String,
}

impl std::fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("EphemeralKeypair")
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}

impl EphemeralKeypair {
    /// Fresh EC P-256 signing key. Fails only on key-generation error.
    pub fn generate() -> Result<Self, FlowError> {
        let mut jwk = Jwk::generate_ec_key(EcCurve::P256)
            .map_err(|e| FlowError::KeyGeneration(e.to_string()))?;
        jwk.set_key_use("sig");
        jwk.set_algorithm("ES256");

        let thumbprint = ec_thumbprint(&jwk)?;
        Ok(Self { jwk, thumbprint })
    }

    /// Restore a keypair from its private JWK JSON export.
    pub fn from_private_json(json: &str) -> Result<Self, FlowError> {
        let jwk =
            Jwk::from_bytes(json.as_bytes()).map_err(|e| FlowError::KeyGeneration(e.to_string()))?;
        let thumbprint = ec_thumbprint(&jwk)?;
        Ok(Self { jwk, thumbprint })
    }

    /// Deterministic key identifier: used as `cnf.jkt` in the client
    /// assertion and as `kid` of the DPoP-embedded JWK. Both tokens must
    /// carry the thumbprint of the same keypair.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Private key as signing input for the DPoP prover.
    pub fn private_jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Private JWK JSON for short-lived external persistence keyed by the
    /// oauth state.
    pub fn export_private(&self) -> Result<String, FlowError> {
        let mut map = Map::new();
        map.insert("alg".into(), Value::from("ES256"));
        map.insert("crv".into(), Value::from(param(&self.jwk, "crv")?));
        map.insert("d".into(), Value::from(param(&self.jwk, "d")?));
        map.insert("kty".into(), Value::from(param(&self.jwk, "kty")?));
        map.insert("use".into(), Value::from("sig"));
        map.insert("x".into(), Value::from(param(&self.jwk, "x")?));
        map.insert("y".into(), Value::from(param(&self.jwk, "y")?));
        Ok(Value::Object(map).to_string())
    }

    /// Public JWK as embedded in the DPoP header: `use`, `alg` and `kid`
    /// (the thumbprint) set, private scalar stripped.
    pub fn public_jwk(&self) -> Result<Jwk, FlowError> {
        let mut map = Map::new();
        map.insert("alg".into(), Value::from("ES256"));
        map.insert("crv".into(), Value::from(param(&self.jwk, "crv")?));
        map.insert("kid".into(), Value::from(self.thumbprint.as_str()));
        map.insert("kty".into(), Value::from(param(&self.jwk, "kty")?));
        map.insert("use".into(), Value::from("sig"));
        map.insert("x".into(), Value::from(param(&self.jwk, "x")?));
        map.insert("y".into(), Value::from(param(&self.jwk, "y")?));
        Jwk::from_map(map).map_err(|e| FlowError::KeyGeneration(e.to_string()))
    }
}

/// RFC 7638 thumbprint of an EC key: SHA-256 over the canonical JSON with
/// the required members in lexicographic order (crv, kty, x, y).
pub fn ec_thumbprint(jwk: &Jwk) -> Result<String, FlowError> {
    let canonical = format!(
        "{{\"crv\":\"{}\",\"kty\":\"{}\",\"x\":\"{}\",\"y\":\"{}\"}}",
        param(jwk, "crv")?,
        param(jwk, "kty")?,
        param(jwk, "x")?,
        param(jwk, "y")?,
    );

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

fn param<'a>(jwk: &'a Jwk, name: &'static str) -> Result<&'a str, FlowError> {
    jwk.parameter(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| FlowError::KeyGeneration(format!("jwk missing '{}' parameter", name)))
}
