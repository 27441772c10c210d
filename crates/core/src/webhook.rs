//! Signature check for payment-processor webhooks.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac-sha256("<t>.<body>")>`.
//! Several `v1` entries may appear while the processor rotates secrets.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew between processor and server.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matched the payload")]
    Mismatch,
}

/// Verify `header` against the raw request body.
pub fn verify(
    header: &str,
    payload: &[u8],
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    for signature in &signatures {
        let mac = mac_for(secret, timestamp, payload)?;
        if mac.verify_slice(signature).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Produce a header value for `payload`, as the processor would.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = match mac_for(secret, timestamp, payload) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    };
    format!("t={timestamp},v1={digest}")
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;

    #[test]
    fn accepts_fresh_signature() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(verify(&header, BODY, SECRET, 1_700_000_100, DEFAULT_TOLERANCE_SECS), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(
            verify(&header, b"{}", SECRET, 1_700_000_000, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_signature() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(
            verify(&header, BODY, SECRET, 1_700_001_000, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn accepts_any_rotated_signature() {
        let good = sign(BODY, SECRET, 1_700_000_000);
        let v1 = good.split_once("v1=").unwrap().1;
        let header = format!("t=1700000000,v1={},v1={v1}", "00".repeat(32));
        assert_eq!(verify(&header, BODY, SECRET, 1_700_000_000, DEFAULT_TOLERANCE_SECS), Ok(()));
    }

    #[test]
    fn rejects_missing_parts() {
        assert_eq!(verify("v1=abcd", BODY, SECRET, 0, 300), Err(SignatureError::Malformed));
        assert_eq!(verify("t=5", BODY, SECRET, 5, 300), Err(SignatureError::Malformed));
    }
}
