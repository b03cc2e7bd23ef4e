//! HMAC-SHA256 request signing, grounded on `shipper`'s `webhook.rs`
//! (`do_send_event`'s `X-Shipper-Signature` header), generalized to the
//! `X-IDP-Signature` header this engine emits.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
#[must_use]
pub fn sign(body: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_64_hex_chars() {
        let sig = sign("{\"a\":1}", "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_input_is_deterministic() {
        assert_eq!(sign("body", "key"), sign("body", "key"));
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        assert_ne!(sign("body", "key-a"), sign("body", "key-b"));
    }
}
