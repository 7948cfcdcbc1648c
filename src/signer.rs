use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256 over the exact bytes that will be transmitted, hex-encoded
/// and prefixed with `sha256=`. Deterministic, no I/O.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hmac_hex(payload, secret))
}

/// Recompute and compare in constant time. Symmetric with [`sign`], so it
/// also serves components receiving third-party webhooks: pass the raw
/// request body and the signature header value.
pub fn verify(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(provided_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let expected_hex = hmac_hex(payload, secret);
    constant_time_eq(expected_hex.as_bytes(), provided_hex.as_bytes())
}

#[allow(clippy::expect_used)]
fn hmac_hex(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
