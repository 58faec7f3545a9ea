//! REST request signing (spec §6: "Signature: HMAC-SHA256 of the
//! canonicalized query string using the API secret").
//!
//! Grounded in `vault/execution.rs::sign_request` (HMAC-SHA256 over a
//! canonical message, hex/base64-encoded digest); this core always targets
//! hex, the form Binance-style venues expect, rather than execution.rs's
//! URL-safe-base64 Polymarket variant.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `canonical_query` (an already-ordered `key=value&...` string) with
/// `secret`, returning the lowercase-hex digest spec §6 names.
pub fn sign_query(secret: &str, canonical_query: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts a key of any length");
    mac.update(canonical_query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the canonical `key=value&...` query string for a request, in a
/// caller-supplied stable field order. Venues sign over the exact bytes
/// sent, so insertion order here must match the order the fields are later
/// form-encoded in.
pub fn canonicalize<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> String {
    fields
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
