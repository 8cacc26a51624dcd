//! Cache key derivation.
//! Keys are intentionally lossy ("Coca-Cola" and "Coca Cola" collide); the
//! stored confidence guards against bad collisions. Punctuation becomes a
//! word break so hyphenated and spaced spellings land on the same key.
//! Deleting punctuation would not give that, and the two schemes differ on
//! apostrophes too: "Ben & Jerry's" keys as `ben jerry s`, not `ben jerrys`.

use std::sync::LazyLock;

use regex::Regex;

use super::LookupRequest;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid non-alphanumeric pattern"));
static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

pub const KEY_PREFIX: &str = "nutrition";

/// Lowercase, break on everything outside `[a-z0-9\s]`, collapse whitespace, trim.
pub fn normalize(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let lower = s.to_lowercase();
    let stripped = NON_ALPHANUMERIC.replace_all(&lower, " ");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

/// `nutrition:{normalize(product)}:{normalize(brand)}`.
pub fn cache_key(request: &LookupRequest) -> String {
    format!(
        "{KEY_PREFIX}:{}:{}",
        normalize(&request.product_name),
        normalize(request.brand_str())
    )
}

/// Key for records resolved by identifier rather than by name.
pub fn id_cache_key(external_id: &str) -> String {
    format!("{KEY_PREFIX}:id:{}", normalize(external_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Coca-Cola"), "coca cola");
        assert_eq!(normalize("  Whole   Milk,\tVitamin D "), "whole milk vitamin d");
        assert_eq!(normalize("Ben & Jerry's"), "ben jerry s");
        assert_eq!(normalize("100% Juice!"), "100 juice");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in [
            "Great Value",
            "Coca-Cola Classic, 12 fl oz",
            "  Häagen-Dazs  Vanilla ",
            "100% Pure Orange Juice!!",
            "a\n\nb",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn cache_key_ignores_case_whitespace_and_punctuation() {
        let a = cache_key(&LookupRequest::new("Coca-Cola").with_brand("Great Value"));
        let b = cache_key(&LookupRequest::new("coca cola").with_brand("great value"));
        let c = cache_key(&LookupRequest::new("COCA  COLA ").with_brand(" Great-Value"));
        assert_eq!(a, "nutrition:coca cola:great value");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn cache_key_without_brand() {
        let key = cache_key(&LookupRequest::new("Whole Milk"));
        assert_eq!(key, "nutrition:whole milk:");
        assert_eq!(key, cache_key(&LookupRequest::new("whole milk").with_brand("")));
    }

    #[test]
    fn cache_key_ignores_size() {
        let a = cache_key(&LookupRequest::new("Milk").with_size("1 gal"));
        let b = cache_key(&LookupRequest::new("Milk"));
        assert_eq!(a, b);
    }
}
