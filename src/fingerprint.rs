use hex;
use sha2::{Digest, Sha256};

/// Webhook event fingerprints for at-most-once processing
///
/// Providers (Apify, Instantly, Cal.com) retry deliveries on slow responses,
/// so the same event can arrive several times within seconds. Each raw body
/// is hashed with SHA-256 and the digest is remembered in a short-lived cache:
///
/// 1. Hash the exact bytes received
/// 2. Prefix with the source so identical bodies from different providers never collide
/// 3. Skip the event if the fingerprint was seen inside the dedup window
pub fn event_fingerprint(source: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{}:{}", source, hex::encode(hasher.finalize()))
}
