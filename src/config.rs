/*
 * Responsibility
 * - 環境変数や設定の読み込み (client id, scope, 静的鍵, JWKS URL など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;

use url::Url;

// Staging defaults so the client runs against the MyInfo test environment
// out of the box. Production deployments override every one of these.
const DEFAULT_DOMAIN: &str = "https://test.api.myinfo.gov.sg";
const DEFAULT_CLIENT_ID: &str = "STG-202327956K-ABNK-BNPLAPPLN";
const DEFAULT_PURPOSE_ID: &str = "7ed6f2ce";
const DEFAULT_TOKEN_JWKS_URL: &str =
    "https://test.authorise.singpass.gov.sg/.well-known/keys.json";
const DEFAULT_DATA_JWKS_URL: &str = "https://test.myinfo.singpass.gov.sg/.well-known/keys.json";

const DEFAULT_SCOPE: &str = "uinfin name sex race dob residentialstatus nationality birthcountry \
                             passtype passstatus passexpirydate \
                             employmentsector mobileno email regadd housingtype hdbtype \
                             cpfcontributions noahistory ownerprivate \
                             employment occupation cpfemployers marital";

// Published staging keypairs (the MyInfo sandbox key material, not secrets).
const DEFAULT_PRIVATE_KEY_SIG: &str = r#"{"alg":"ES256","crv":"P-256","d":"Y7y4AtZ_j_4FNS0tRNYKySgdx-QcBQtjQzf1NRTHDCI","kty":"EC","use":"sig","x":"k-K2AGmjySAjxPhHLA_vCv8aa-oIoACSWhyZEQmRewc","y":"WMro28Kf4Y5Y5fiwOL-WRAo9AYFBhv8GNbtr-xnz4a0"}"#;
const DEFAULT_PRIVATE_KEY_ENC: &str = r#"{"alg":"ECDH-ES+A256KW","crv":"P-256","d":"fqyHyvArMu7NTc_G354VCHYqDUv0WgL8TNGg5IBpaUU","kty":"EC","use":"enc","x":"AsflFcp_M8WQxWbxImCAtJ0zWf4yHYz_3jU4faD5ODg","y":"Nc8-inmbKEOyS6VGKoZDPc2mFhugrx27lcVis9E_jWs"}"#;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Immutable per-client configuration.
///
/// A resource profile (context/version/scope variant) is just a different
/// `Config` value; the orchestrator never carries class-level statics.
#[derive(Clone, Debug)]
pub struct Config {
    pub domain: String,
    pub context: String,
    pub version: String,
    pub client_id: String,
    pub purpose_id: String,
    // Space-delimited scope list, joined as-is into the authorize URL.
    pub scope: String,

    // Static client keys, JWK JSON documents. One ES256 signing key and one
    // ECDH-ES+A256KW encryption key, loaded once per process.
    pub private_key_sig: String,
    pub private_key_enc: String,

    pub token_verification_jwks_url: String,
    pub data_verification_jwks_url: String,

    pub cert_verify: bool,
    pub api_timeout_seconds: u64,
    pub state_ttl_seconds: u64,
    pub jwks_cache_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let domain = std::env::var("MYINFO_DOMAIN").unwrap_or_else(|_| DEFAULT_DOMAIN.to_string());
        Url::parse(&domain).map_err(|_| ConfigError::Invalid("MYINFO_DOMAIN"))?;

        let context = std::env::var("MYINFO_CONTEXT").unwrap_or_else(|_| "com".to_string());
        let version = std::env::var("MYINFO_VERSION").unwrap_or_else(|_| "v4".to_string());

        let client_id =
            std::env::var("MYINFO_CLIENT_ID").unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string());
        let purpose_id =
            std::env::var("MYINFO_PURPOSE_ID").unwrap_or_else(|_| DEFAULT_PURPOSE_ID.to_string());

        let scope = std::env::var("MYINFO_SCOPE")
            .unwrap_or_else(|_| DEFAULT_SCOPE.split_whitespace().collect::<Vec<_>>().join(" "));
        if scope.trim().is_empty() {
            return Err(ConfigError::Invalid("MYINFO_SCOPE"));
        }

        // Ansible vault replaces double quotes with single quotes; revert.
        let private_key_sig = std::env::var("MYINFO_PRIVATE_KEY_SIG")
            .unwrap_or_else(|_| DEFAULT_PRIVATE_KEY_SIG.to_string())
            .replace('\'', "\"");
        let private_key_enc = std::env::var("MYINFO_PRIVATE_KEY_ENC")
            .unwrap_or_else(|_| DEFAULT_PRIVATE_KEY_ENC.to_string())
            .replace('\'', "\"");

        let token_verification_jwks_url = std::env::var("MYINFO_JWKS_TOKEN_VERIFICATION_URL")
            .unwrap_or_else(|_| DEFAULT_TOKEN_JWKS_URL.to_string());
        let data_verification_jwks_url = std::env::var("MYINFO_JWKS_DATA_VERIFICATION_URL")
            .unwrap_or_else(|_| DEFAULT_DATA_JWKS_URL.to_string());

        let cert_verify = std::env::var("MYINFO_CERT_VERIFY")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let api_timeout_seconds = std::env::var("MYINFO_API_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let state_ttl_seconds = std::env::var("MYINFO_STATE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600); // 10 min: the implicit flow-level timeout

        let jwks_cache_ttl_seconds = std::env::var("MYINFO_JWKS_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600); // MyInfo requires caching JWKS for at least 1h

        Ok(Self {
            domain,
            context,
            version,
            client_id,
            purpose_id,
            scope,
            private_key_sig,
            private_key_enc,
            token_verification_jwks_url,
            data_verification_jwks_url,
            cert_verify,
            api_timeout_seconds,
            state_ttl_seconds,
            jwks_cache_ttl_seconds,
        })
    }

    /// URL of an API resource: `{domain}/{context}/{version}/{resource}`.
    pub fn api_url(&self, resource: &str) -> String {
        format!("{}/{}/{}/{}", self.domain, self.context, self.version, resource)
    }

    /// Staging profile with default key material. Used by tests and demos.
    pub fn staging() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            context: "com".to_string(),
            version: "v4".to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            purpose_id: DEFAULT_PURPOSE_ID.to_string(),
            scope: DEFAULT_SCOPE.split_whitespace().collect::<Vec<_>>().join(" "),
            private_key_sig: DEFAULT_PRIVATE_KEY_SIG.to_string(),
            private_key_enc: DEFAULT_PRIVATE_KEY_ENC.to_string(),
            token_verification_jwks_url: DEFAULT_TOKEN_JWKS_URL.to_string(),
            data_verification_jwks_url: DEFAULT_DATA_JWKS_URL.to_string(),
            cert_verify: false,
            api_timeout_seconds: 30,
            state_ttl_seconds: 600,
            jwks_cache_ttl_seconds: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_joins_domain_context_version() {
        let config = Config::staging();
        assert_eq!(
            config.api_url("token"),
            "https://test.api.myinfo.gov.sg/com/v4/token"
        );
        assert_eq!(
            config.api_url("authorize"),
            "https://test.api.myinfo.gov.sg/com/v4/authorize"
        );
    }

    #[test]
    fn staging_scope_is_space_delimited() {
        let config = Config::staging();
        assert!(config.scope.starts_with("uinfin name sex race dob"));
        assert!(config.scope.ends_with("marital"));
        assert!(!config.scope.contains("  "));
    }
}
