//! HMAC-SHA256 message signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded `HMAC-SHA256(secret, payload)`.
pub fn sign(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the signature for `payload` and compare it to `signature`
/// in constant time. The comparison is on the hex text, so case matters.
pub fn signature_matches(secret: &str, payload: &str, signature: &str) -> bool {
    let expected = sign(secret, payload);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
