//! Webhook signature verification.
//!
//! The provider signs each delivery with `Stripe-Signature: t=<unix>,v1=<hex>`
//! where `v1` is HMAC-SHA256 over `"{t}.{raw body}"` using the shared webhook
//! secret. Verification is the only admission check on the webhook endpoint,
//! so a failure here must reject the request before any parsing or dispatch.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Computes the hex signature for a timestamp + payload pair.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a `t=...,v1=...` signature header against the raw payload.
///
/// Rejects when the header is malformed, the timestamp is outside
/// `tolerance_secs` of the current time, or the digest does not match.
pub fn verify(payload: &[u8], header: &str, secret: &str, tolerance_secs: u64) -> bool {
    verify_at(
        payload,
        header,
        secret,
        tolerance_secs,
        chrono::Utc::now().timestamp(),
    )
}

/// Verification against an explicit clock, so tolerance behavior is testable.
pub fn verify_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let mut timestamp = None;
    let mut candidate = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", val)) => timestamp = val.parse::<i64>().ok(),
            Some(("v1", val)) => candidate = Some(val),
            _ => {}
        }
    }

    let (Some(ts), Some(candidate)) = (timestamp, candidate) else {
        return false;
    };

    if (now - ts).unsigned_abs() > tolerance_secs {
        return false;
    }

    let expected = sign(secret, ts, payload);
    constant_time_eq(&expected, candidate)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
