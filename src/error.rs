/*
 * Responsibility
 * - フロー共通の FlowError 定義
 * - transport / store / verification エラーを統一的に変換
 */
use thiserror::Error;

use crate::services::jose::verify::VerifyError;
use crate::services::state::store::StoreError;
use crate::transport::client::TransportError;

/// Terminal outcome of a retrieval flow. A flow ends exactly once, either
/// with decrypted claims or with one of these.
#[derive(Debug, Error)]
pub enum FlowError {
    /// State is missing, expired, or already consumed. Callers restart the
    /// flow from `initiate`.
    #[error("invalid or expired oauth state")]
    InvalidState,

    /// Network failure, timeout, or a non-2xx response outside the token
    /// exchange. Terminal for this attempt; proofs are single-use, so there
    /// is no automatic resend.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The token endpoint answered non-2xx. The response body is kept for
    /// the internal diagnostic record.
    #[error("token exchange failed with status {status}")]
    TokenExchangeFailed { status: u16, body: String },

    /// Signature / structure / claim failure while verifying a compact JWS.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// The verified access token is past its expiry window.
    #[error("access token expired")]
    TokenExpired,

    /// A remote key-set document could not be parsed at all.
    #[error("malformed remote key set")]
    MalformedKeySet,

    /// Envelope decryption failed. Deliberately opaque: the sub-cause (bad
    /// key, corrupted ciphertext, tag mismatch) is never surfaced, to avoid
    /// acting as a decryption oracle.
    #[error("envelope decryption failed")]
    DecryptionFailed,

    /// Ephemeral or static key material could not be generated/loaded.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The assertion/proof signer rejected its input. Indicates broken key
    /// material, not remote behavior.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// State-store backend failure. Fail-closed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
