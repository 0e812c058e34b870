use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_matches(expected: Result<String, hmac::digest::InvalidLength>, provided: &str) -> bool {
    match expected {
        Ok(expected) => expected.as_bytes().ct_eq(provided.trim().as_bytes()).into(),
        Err(_) => false,
    }
}

/// Checkout confirmation: signature over `order_id|payment_id`.
pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let expected = sign(secret, format!("{}|{}", order_id, payment_id).as_bytes());
    constant_time_matches(expected, signature)
}

/// Webhook delivery: signature over the raw request body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = sign(secret, body);
    constant_time_matches(expected, signature)
}

/// Identity handoff from the OAuth front end: signature over the raw request body.
pub fn verify_identity_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    verify_webhook_signature(secret, body, signature)
}
