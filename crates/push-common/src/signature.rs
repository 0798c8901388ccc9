//! HMAC-SHA256 signed-string handling for the connect handshake.
//!
//! A signed string has the form
//! `"<hex(HMAC-SHA256(key, payload))>-<base64(payload)>"`. The backend
//! signs the handshake payload with the shared secret; the relay verifies
//! it without any clock or store access.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of a SHA-256 digest.
const DIGEST_LEN: usize = 32;

/// Verifies a signed string against `key` and returns the raw payload bytes.
///
/// Returns `None` if the string is missing its payload half, the signature
/// half does not hex-decode to exactly 32 bytes, the payload half is not
/// valid base64, or the digest does not match. The digest comparison is
/// constant time: a forgery costs the same whether it differs in the first
/// byte or the last.
///
/// # Examples
///
/// ```
/// use push_common::signature;
///
/// let signed = signature::sign(b"{}", b"secret");
/// assert_eq!(signature::verify(&signed, b"secret"), Some(b"{}".to_vec()));
/// assert_eq!(signature::verify(&signed, b"other"), None);
/// ```
#[must_use]
pub fn verify(signed: &str, key: &[u8]) -> Option<Vec<u8>> {
    let (signature, payload) = signed.split_once('-')?;
    if payload.is_empty() {
        return None;
    }
    let signature = hex::decode(signature).ok()?;
    if signature.len() != DIGEST_LEN {
        return None;
    }
    let payload = BASE64.decode(payload).ok()?;

    let digest = compute_digest(key, &payload);
    if bool::from(digest.ct_eq(&signature)) {
        Some(payload)
    } else {
        None
    }
}

/// Signs `payload` with `key`, producing the wire-format signed string.
#[must_use]
pub fn sign(payload: &[u8], key: &[u8]) -> String {
    let digest = compute_digest(key, payload);
    format!("{}-{}", hex::encode(digest), BASE64.encode(payload))
}

fn compute_digest(key: &[u8], payload: &[u8]) -> [u8; DIGEST_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().into()
}
