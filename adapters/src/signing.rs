use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `base`, keyed by `key`, hex-encoded lowercase.
pub fn hmac_sha256_hex(key: &str, base: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Same as [`hmac_sha256_hex`] but upper-cased, as Lazada expects.
pub fn hmac_sha256_hex_upper(key: &str, base: &str) -> String {
    hmac_sha256_hex(key, base).to_uppercase()
}

/// Sorts `pairs` by key ascending and concatenates each as `key||value`,
/// with no separator — the canonical form TikTok/Lazada sign over.
pub fn sorted_key_value_concat(pairs: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = pairs.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    sorted.iter().map(|(k, v)| format!("{k}{v}")).collect::<Vec<_>>().join("")
}
