/*
 * Responsibility
 * - 取得フロー全体のオーケストレーション (initiate -> authorize -> complete)
 * - state の単回使用保証と PKCE / authorize URL の構築
 */
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::FlowError;
use crate::services::jose::assertion::AssertionSigner;
use crate::services::jose::dpop::DpopProver;
use crate::services::jose::envelope::EnvelopeDecryptor;
use crate::services::jose::keypair::EphemeralKeypair;
use crate::services::jose::verify::{ClaimSet, VerifyError, verify_with_cache};
use crate::services::jose::{Clock, SystemClock};
use crate::services::keyset::KeySetCache;
use crate::services::state::store::{StateStore, StoreError};
use crate::transport::client::{ApiRequest, HttpMethod, Transport, TransportError};

const STATE_KEY_PREFIX: &str = "myinfo:state:";
const KEYPAIR_KEY_PREFIX: &str = "myinfo:keys:";

const STATE_LENGTH: usize = 16;
const STATE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
// 3 state collisions in a row means the store is lying, not bad luck.
const STATE_ATTEMPTS: usize = 3;

// Drift allowance when enforcing the access token's own exp claim.
const EXPIRY_LEEWAY_SECONDS: i64 = 60;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

// Query encoding used by the authorize endpoint: unreserved characters plus
// `,` `/` `:` stay bare, spaces become %20.
const QUERY_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b',')
    .remove(b'/')
    .remove(b':');

/// Progress marker for one retrieval flow, reported in failure logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowStage {
    Initiated,
    CodeReceived,
    TokenExchanged,
    ResourceFetched,
    Decrypted,
}

/// Output of `initiate`: the opaque state to round-trip through the
/// callback and the URL to redirect the user to.
#[derive(Clone, Debug)]
pub struct InitiatedFlow {
    pub state: String,
    pub authorize_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Drives one complete person-data retrieval: authorize redirect, code/state
/// callback, DPoP-bound token exchange, person fetch, envelope decrypt.
///
/// Holds no per-flow mutable state; everything flow-scoped travels through
/// arguments and the shared `StateStore`, so concurrent flows never collide.
#[derive(Clone)]
pub struct FlowOrchestrator {
    config: Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateStore>,
    keysets: Arc<KeySetCache>,
    assertion: Arc<AssertionSigner>,
    prover: Arc<DpopProver>,
    envelope: Arc<EnvelopeDecryptor>,
    clock: Arc<dyn Clock>,
}

impl FlowOrchestrator {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, FlowError> {
        Self::with_clock(config, transport, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FlowError> {
        let keysets = Arc::new(KeySetCache::new(
            Arc::clone(&transport),
            config.jwks_cache_ttl_seconds,
        ));
        let assertion = Arc::new(AssertionSigner::new(
            &config.client_id,
            &config.private_key_sig,
            Arc::clone(&clock),
        )?);
        let prover = Arc::new(DpopProver::new(Arc::clone(&clock)));
        let envelope = Arc::new(EnvelopeDecryptor::new(
            &config.private_key_enc,
            &config.data_verification_jwks_url,
        )?);

        Ok(Self {
            config,
            transport,
            store,
            keysets,
            assertion,
            prover,
            envelope,
            clock,
        })
    }

    /// Start a flow: draw a fresh opaque state, reserve it in the store for
    /// the flow-level TTL, and build the authorize redirect URL. The state
    /// doubles as the PKCE code verifier.
    pub async fn initiate(&self, callback_url: &str) -> Result<InitiatedFlow, FlowError> {
        let ttl = Duration::from_secs(self.config.state_ttl_seconds);

        for _ in 0..STATE_ATTEMPTS {
            let state = generate_state()?;
            let key = format!("{STATE_KEY_PREFIX}{state}");

            if self.store.set_if_absent_with_ttl(&key, "pending", ttl).await? {
                let authorize_url = self.build_authorize_url(&state, callback_url);
                debug!(stage = ?FlowStage::Initiated, state = %state, "flow initiated");
                return Ok(InitiatedFlow {
                    state,
                    authorize_url,
                });
            }
        }

        Err(StoreError::BackendCommand("state reservation kept colliding".to_string()).into())
    }

    /// Finish a flow with the code/state pair delivered to the callback.
    ///
    /// The state is consumed atomically on entry: of all concurrent or
    /// replayed callbacks carrying the same state, exactly one proceeds and
    /// the rest get `InvalidState`. The persisted ephemeral keypair is
    /// deleted on every exit path.
    pub async fn complete(
        &self,
        auth_code: &str,
        state: &str,
        callback_url: &str,
    ) -> Result<ClaimSet, FlowError> {
        let state_key = format!("{STATE_KEY_PREFIX}{state}");
        let keypair_key = format!("{KEYPAIR_KEY_PREFIX}{state}");

        let mut stage = FlowStage::CodeReceived;
        let result = self
            .run(auth_code, state, callback_url, &state_key, &keypair_key, &mut stage)
            .await;

        let _ = self.store.del(&keypair_key).await;

        match &result {
            Ok(_) => debug!(stage = ?stage, "flow completed"),
            Err(e) => error!(stage = ?stage, error = %e, "flow failed"),
        }
        result
    }

    async fn run(
        &self,
        auth_code: &str,
        state: &str,
        callback_url: &str,
        state_key: &str,
        keypair_key: &str,
        stage: &mut FlowStage,
    ) -> Result<ClaimSet, FlowError> {
        // DEL is atomic: the winner sees 1, every concurrent or replayed
        // callback with the same state sees 0.
        if self.store.del(state_key).await? == 0 {
            return Err(FlowError::InvalidState);
        }

        // Fresh DPoP keypair per flow, persisted for the residual flow
        // window so a crash mid-flow leaves nothing usable past the TTL.
        let keypair = EphemeralKeypair::generate()?;
        let ttl = Duration::from_secs(self.config.state_ttl_seconds);
        let reserved = self
            .store
            .set_if_absent_with_ttl(keypair_key, &keypair.export_private()?, ttl)
            .await?;
        if !reserved {
            // The state was just consumed, so this slot can only be stale
            // leftovers from a store that did not honor the earlier delete.
            return Err(
                StoreError::BackendCommand("ephemeral key slot already occupied".to_string())
                    .into(),
            );
        }

        let token_url = self.config.api_url("token");
        let client_assertion = self.assertion.build(&token_url, keypair.thumbprint())?;
        let proof = self
            .prover
            .build(&token_url, &keypair, HttpMethod::Post, None)?;

        let mut request = ApiRequest::post(&token_url)
            .header("DPoP", proof)
            .header("Cache-Control", "no-cache");
        request.form = vec![
            ("code", auth_code.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("redirect_uri", callback_url.to_string()),
            ("client_assertion", client_assertion),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()),
            // PKCE: the state itself is the code verifier.
            ("code_verifier", state.to_string()),
        ];

        let response = self.transport.request(request).await.map_err(|e| match e {
            TransportError::Status { status, body, .. } => {
                FlowError::TokenExchangeFailed { status, body }
            }
            other => FlowError::Transport(other),
        })?;
        *stage = FlowStage::TokenExchanged;

        let token: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|_| FlowError::Verify(VerifyError::ClaimDecode))?;
        let access_token = token.access_token;

        let claims = verify_with_cache(
            &access_token,
            &self.config.token_verification_jwks_url,
            &self.keysets,
        )
        .await?;
        self.enforce_token_expiry(&claims)?;

        let sub = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or(FlowError::Verify(VerifyError::ClaimDecode))?;

        let person_url = format!("{}/{}/", self.config.api_url("person"), sub);
        let proof = self
            .prover
            .build(&person_url, &keypair, HttpMethod::Get, Some(&access_token))?;

        let mut request = ApiRequest::get(&person_url)
            .header("Authorization", format!("DPoP {access_token}"))
            .header("dpop", proof)
            .header("Cache-Control", "no-cache");
        request.query = vec![("scope", self.config.scope.clone())];

        let response = self.transport.request(request).await?;
        *stage = FlowStage::ResourceFetched;

        let person = self.envelope.decrypt(&response.body, &self.keysets).await?;
        *stage = FlowStage::Decrypted;
        Ok(person)
    }

    /// The issuer keeps tokens short-lived; this is a local backstop on the
    /// verified `exp` claim. A token without a numeric `exp` is rejected.
    fn enforce_token_expiry(&self, claims: &ClaimSet) -> Result<(), FlowError> {
        let exp = claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(FlowError::TokenExpired)?;

        if exp + EXPIRY_LEEWAY_SECONDS <= self.clock.now_unix() {
            return Err(FlowError::TokenExpired);
        }
        Ok(())
    }

    /// Authorize redirect URL with the query in the order the portal
    /// documents it. Byte-stable for a given state and callback.
    fn build_authorize_url(&self, state: &str, callback_url: &str) -> String {
        let code_challenge = generate_code_challenge(state);
        let pairs = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.scope.as_str()),
            ("purpose_id", self.config.purpose_id.as_str()),
            ("response_type", "code"),
            ("code_challenge", code_challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("redirect_uri", callback_url),
        ];

        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, QUERY_SAFE)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.config.api_url("authorize"), query)
    }
}

/// PKCE S256 challenge: base64url(SHA-256(verifier)), no padding.
pub fn generate_code_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

// 16 alphanumeric characters from OS randomness. Rejection sampling keeps
// each character uniform (248 = 4 * 62).
fn generate_state() -> Result<String, FlowError> {
    let mut state = String::with_capacity(STATE_LENGTH);

    while state.len() < STATE_LENGTH {
        let mut buf = [0u8; 32];
        getrandom::fill(&mut buf).map_err(|e| FlowError::KeyGeneration(e.to_string()))?;

        for byte in buf {
            if state.len() == STATE_LENGTH {
                break;
            }
            if byte < 248 {
                state.push(STATE_CHARSET[(byte % 62) as usize] as char);
            }
        }
    }

    Ok(state)
}
