//! Keyed message authentication.
//!
//! Every inbound message carries an HMAC-SHA256 over the compact JSON
//! serialization of its `contents`, keyed with the sender's per-user
//! secret. The secret is issued by the external login service and read
//! here from the store; verification is a purely local, deterministic
//! check with no retries.

use crate::error::EngineError;
use crate::store::Store;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::Envelope;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length")
}

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`. Exposed for the
/// test client and for clients embedding this crate.
pub fn compute_hmac(payload: &str, secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a supplied hex code against the expected
/// HMAC. Undecodable hex counts as a mismatch.
pub fn verify_hmac(payload: &str, secret: &str, supplied_hex: &str) -> bool {
    let supplied = match hex::decode(supplied_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = mac_for(secret);
    mac.update(payload.as_bytes());
    mac.verify_slice(&supplied).is_ok()
}

/// Checks the envelope's code against the sender's stored secret.
///
/// The canonical payload is the compact JSON re-serialization of
/// `contents` as parsed, preserving the sender's field order.
pub async fn authenticate(store: &Store, envelope: &Envelope) -> Result<(), EngineError> {
    let secret = store
        .secret(&envelope.user_id)
        .await?
        .ok_or_else(|| EngineError::NotAuthenticated(envelope.user_id.clone()))?;

    let payload = envelope.contents.to_string();
    if verify_hmac(&payload, &secret, &envelope.hmac) {
        Ok(())
    } else {
        Err(EngineError::AuthenticationFailed(envelope.user_id.clone()))
    }
}
