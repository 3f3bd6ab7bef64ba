//! Webhook signature verification using HMAC-SHA256.
//!
//! Bitbucket signs webhook bodies with the secret configured on the webhook
//! and sends the result in the `X-Hub-Signature` header as `sha256=<hex>`.
//! Verification only happens when a secret is configured; it runs before the
//! body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Why a delivery failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,
}

/// Parses a `sha256=<hex>` header into raw bytes.
///
/// Returns `None` for a missing prefix, another algorithm or invalid hex.
///
/// ```
/// use review_relay::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=abcd"), Some(vec![0xab, 0xcd]));
/// assert!(parse_signature_header("sha1=abcd").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.trim().strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Signs `payload` and formats the result as a header value.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `header` against `payload` in constant time.
///
/// ```
/// use review_relay::webhooks::{SignatureError, sign_payload, verify_signature};
///
/// let header = sign_payload(b"{}", b"secret");
/// assert_eq!(verify_signature(b"{}", Some(&header), b"secret"), Ok(()));
/// assert_eq!(
///     verify_signature(b"{}", Some(&header), b"other"),
///     Err(SignatureError::Mismatch)
/// );
/// assert_eq!(verify_signature(b"{}", None, b"secret"), Err(SignatureError::Missing));
/// ```
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let expected = parse_signature_header(header).ok_or(SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Mismatch)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
