//! Request signing for the internal fetch RPC.
//!
//! A fetch request is signed with HMAC-SHA256 over the raw request body. The
//! key is the concatenation `secret ‖ source ‖ rtype ‖ timestamp ‖ nonce`,
//! taken byte-for-byte as sent on the wire. The verifier recomputes the MAC
//! from the received parameters and rejects requests whose timestamp is more
//! than [`REPLAY_WINDOW_SECS`] away from its own clock.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

use crate::error::{EngineError, Result};
use crate::types::RequestKind;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed clock difference between signer and verifier, in seconds.
pub const REPLAY_WINDOW_SECS: i64 = 600;

/// The signed query parameters of one fetch RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParams {
    /// Source name.
    pub name: String,
    /// Request kind.
    pub rtype: RequestKind,
    /// Unix seconds, as a decimal string.
    pub timestamp: String,
    /// Random integer, as a decimal string.
    pub nonce: String,
    /// Hex-encoded HMAC-SHA256.
    pub signature: String,
}

/// Signs and verifies fetch RPCs with a shared secret.
#[derive(Clone)]
pub struct Signer {
    secret: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    /// Create a signer for the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign `body` for `name`/`rtype` at `now` (unix seconds) with a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the MAC cannot be keyed.
    pub fn sign_now(
        &self,
        body: &[u8],
        name: &str,
        rtype: RequestKind,
        now: i64,
    ) -> Result<SignedParams> {
        let nonce = rand::thread_rng().gen_range(0..100_000_000u32).to_string();
        let timestamp = now.to_string();
        let signature = self.signature(body, name, rtype.as_str(), &timestamp, &nonce)?;
        Ok(SignedParams {
            name: name.to_string(),
            rtype,
            timestamp,
            nonce,
            signature,
        })
    }

    /// Hex-encoded signature of `body` under the given parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the MAC cannot be keyed.
    pub fn signature(
        &self,
        body: &[u8],
        name: &str,
        rtype: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<String> {
        let mac = self.mac(name, rtype, timestamp, nonce, body)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a received request at `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Auth`] if the timestamp is malformed or outside
    /// the replay window, or if the signature does not match the body.
    pub fn verify(&self, params: &SignedParams, body: &[u8], now: i64) -> Result<()> {
        let ts: i64 = params
            .timestamp
            .parse()
            .map_err(|_| EngineError::Auth("malformed timestamp".into()))?;
        if now.abs_diff(ts) > REPLAY_WINDOW_SECS.unsigned_abs() {
            return Err(EngineError::Auth("timestamp outside replay window".into()));
        }
        let expected = hex::decode(&params.signature)
            .map_err(|_| EngineError::Auth("malformed signature".into()))?;
        self.mac(
            &params.name,
            params.rtype.as_str(),
            &params.timestamp,
            &params.nonce,
            body,
        )?
        .verify_slice(&expected)
        .map_err(|_| EngineError::Auth("signature mismatch".into()))
    }

    fn mac(
        &self,
        name: &str,
        rtype: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> Result<HmacSha256> {
        let mut key = Vec::with_capacity(
            self.secret.len() + name.len() + rtype.len() + timestamp.len() + nonce.len(),
        );
        for part in [self.secret.as_str(), name, rtype, timestamp, nonce] {
            key.extend_from_slice(part.as_bytes());
        }
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| EngineError::Config(format!("invalid signing key: {e}")))?;
        mac.update(body);
        Ok(mac)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
