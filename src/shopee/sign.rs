//! HMAC-SHA256 request signing for the partner API.
//!
//! The base string is `partner_id + path + timestamp`, with the access
//! token and shop id appended in that order when present. Public
//! endpoints (auth URL, token exchange, token refresh) sign the bare
//! form; shop-scoped calls include both optional fields.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase-hex signature for one outbound call.
/// Pure and deterministic; identical inputs always yield identical output.
pub fn sign(
    partner_id: &str,
    partner_key: &str,
    path: &str,
    timestamp: i64,
    access_token: Option<&str>,
    shop_id: Option<&str>,
) -> String {
    let mut base = format!("{partner_id}{path}{timestamp}");
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        base.push_str(token);
    }
    if let Some(shop) = shop_id.filter(|s| !s.is_empty()) {
        base.push_str(shop);
    }

    let mut mac = HmacSha256::new_from_slice(partner_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "shpk_test_key";

    #[test]
    fn deterministic_for_identical_inputs() {
        let a = sign("12345", KEY, "/api/v2/shop/get_shop_info", 1700000000, Some("tok"), Some("999"));
        let b = sign("12345", KEY, "/api/v2/shop/get_shop_info", 1700000000, Some("tok"), Some("999"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn each_input_changes_the_output() {
        let base = sign("12345", KEY, "/p", 1700000000, Some("tok"), Some("999"));
        assert_ne!(base, sign("12346", KEY, "/p", 1700000000, Some("tok"), Some("999")));
        assert_ne!(base, sign("12345", KEY, "/q", 1700000000, Some("tok"), Some("999")));
        assert_ne!(base, sign("12345", KEY, "/p", 1700000001, Some("tok"), Some("999")));
        assert_ne!(base, sign("12345", KEY, "/p", 1700000000, Some("tok2"), Some("999")));
        assert_ne!(base, sign("12345", KEY, "/p", 1700000000, Some("tok"), Some("998")));
        assert_ne!(base, sign("12345", "other_key", "/p", 1700000000, Some("tok"), Some("999")));
    }

    #[test]
    fn empty_optionals_match_missing_optionals() {
        let bare = sign("12345", KEY, "/p", 1700000000, None, None);
        let empty = sign("12345", KEY, "/p", 1700000000, Some(""), Some(""));
        assert_eq!(bare, empty);
    }

    #[test]
    fn token_only_differs_from_token_and_shop() {
        let token_only = sign("12345", KEY, "/p", 1700000000, Some("tok"), None);
        let both = sign("12345", KEY, "/p", 1700000000, Some("tok"), Some("999"));
        assert_ne!(token_only, both);
    }
}
