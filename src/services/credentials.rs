//! Credential primitives: generation, hashing and comparison.
//!
//! # Key Format
//!
//! `sl_live_` followed by 48 hex characters (24 random bytes). Only the
//! SHA-256 hex digest is stored; listings show the first 12 characters.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::models::{
    api_key::{KeySource, NewApiKey},
    tier::Tier,
};

pub const KEY_PREFIX: &str = "sl_live_";

const DISPLAY_PREFIX_LEN: usize = 12;

/// Generate a fresh raw API key from the OS-seeded CSPRNG.
pub fn generate_api_key() -> String {
    let bytes: [u8; 24] = rand::random();
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

/// SHA-256 hex digest of a raw key.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, non-secret fragment used to recognise a key in listings.
pub fn display_prefix(raw_key: &str) -> String {
    let head: String = raw_key.chars().take(DISPLAY_PREFIX_LEN).collect();
    format!("{head}...")
}

/// Compare two secrets without short-circuiting on the first differing byte.
///
/// Length differences are not hidden; only the content comparison is
/// constant time.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Generate a key and build the record to insert.
///
/// Returns the insertable record and the raw key. The raw key must be shown
/// to the owner now or discarded; it cannot be recovered later.
pub fn issue(name: &str, owner_email: &str, tier: Tier, source: KeySource) -> (NewApiKey, String) {
    let raw_key = generate_api_key();
    let record = NewApiKey {
        id: Uuid::new_v4(),
        key_hash: hash_api_key(&raw_key),
        key_prefix: display_prefix(&raw_key),
        name: name.to_string(),
        owner_email: owner_email.to_string(),
        tier,
        daily_quota: tier.daily_quota(),
        source,
    };
    (record, raw_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_expected_shape() {
        let key = generate_api_key();
        assert!(key.starts_with(KEY_PREFIX));
        assert_eq!(key.len(), KEY_PREFIX.len() + 48);
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn hash_is_sha256_hex() {
        // echo -n "abc" | sha256sum
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn display_prefix_masks_the_secret() {
        assert_eq!(display_prefix("sl_live_0123456789abcdef"), "sl_live_0123...");
    }

    #[test]
    fn secrets_match_requires_exact_bytes() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3creT"));
        assert!(!secrets_match("s3cret", "s3cret-longer"));
        assert!(!secrets_match("", "s3cret"));
    }

    #[test]
    fn issue_derives_quota_from_tier() {
        let (record, raw) = issue("ci", "ci@example.com", Tier::Pro, KeySource::Direct);
        assert_eq!(record.daily_quota, 10_000);
        assert_eq!(record.key_hash, hash_api_key(&raw));
        assert_eq!(record.key_prefix.len(), DISPLAY_PREFIX_LEN + 3);
        assert!(raw.starts_with(record.key_prefix.trim_end_matches('.')));
    }
}
