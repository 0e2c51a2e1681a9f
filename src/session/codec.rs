//! Sealing and unsealing of session tokens.
//!
//! A token is `v1.` followed by the URL-safe base64 of a 12-byte nonce and the
//! AES-256-GCM ciphertext of `{"iat": <ms>, "payload": {...}}`. The key is the
//! SHA-256 digest of the configured secret. GCM authentication covers both
//! tampering and tokens sealed under another secret.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

use super::payload::SessionPayload;

const TOKEN_PREFIX: &str = "v1.";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_SECRET_LEN: usize = 32;
/// Issue times further ahead of the local clock than this are refused.
const MAX_CLOCK_SKEW_MS: u64 = 60_000;

/// Errors produced by the session codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Malformed, tampered, or sealed under a different secret
    #[error("invalid session token: {0}")]
    InvalidToken(&'static str),

    /// Authentic but older than the caller's TTL
    #[error("session expired {expired_ms_ago} ms ago")]
    Expired { expired_ms_ago: u64 },

    #[error("failed to seal session: {0}")]
    Seal(String),

    #[error("session secret must be at least {min} bytes")]
    WeakSecret { min: usize },
}

#[derive(Serialize)]
struct SealedEnvelope<'a> {
    iat: u64,
    payload: &'a SessionPayload,
}

#[derive(Deserialize)]
struct OpenedEnvelope {
    iat: u64,
    payload: SessionPayload,
}

/// Authenticated encryption of session payloads.
pub struct SessionCodec {
    cipher: Aes256Gcm,
}

impl SessionCodec {
    /// Create a codec keyed by `secret`, which must be at least 32 bytes.
    pub fn new(secret: &str) -> Result<Self, SessionError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(SessionError::WeakSecret { min: MIN_SECRET_LEN });
        }

        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SessionError::Seal(format!("invalid key length: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Seal `payload` into a token issued at `now_ms`.
    pub fn seal(&self, payload: &SessionPayload, now_ms: u64) -> Result<String, SessionError> {
        let plaintext = serde_json::to_vec(&SealedEnvelope { iat: now_ms, payload })
            .map_err(|e| SessionError::Seal(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| SessionError::Seal("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(sealed)))
    }

    /// Open a token and check it is no older than `ttl` at `now_ms`.
    pub fn unseal(
        &self,
        token: &str,
        ttl: Duration,
        now_ms: u64,
    ) -> Result<SessionPayload, SessionError> {
        let encoded = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(SessionError::InvalidToken("unknown token version"))?;

        let sealed = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SessionError::InvalidToken("malformed encoding"))?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(SessionError::InvalidToken("token too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SessionError::InvalidToken("authentication failed"))?;

        let envelope: OpenedEnvelope = serde_json::from_slice(&plaintext)
            .map_err(|_| SessionError::InvalidToken("malformed payload"))?;

        if !envelope.payload.is_consistent() {
            return Err(SessionError::InvalidToken("incomplete identity"));
        }

        if envelope.iat > now_ms.saturating_add(MAX_CLOCK_SKEW_MS) {
            return Err(SessionError::InvalidToken("issued in the future"));
        }

        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at = envelope.iat.saturating_add(ttl_ms);
        if now_ms > expires_at {
            return Err(SessionError::Expired {
                expired_ms_ago: now_ms - expires_at,
            });
        }

        Ok(envelope.payload)
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}
