//! API key generation and hashing.
//!
//! Keys look like `sna_<32 hex chars>`. Only the SHA-256 of the full
//! plaintext is stored; the first 8 characters are kept for display.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix identifying our API keys.
const KEY_PREFIX: &str = "sna_";

/// Length of the display prefix stored alongside the hash.
const DISPLAY_PREFIX_LEN: usize = 8;

/// A freshly generated API key. The plaintext exists only in this value.
#[derive(Debug)]
pub struct IssuedApiKey {
    /// Full plaintext token, shown to the user once.
    pub plaintext: String,
    /// SHA-256 hex of the plaintext, for storage.
    pub key_hash: String,
    /// First 8 characters of the plaintext, for display.
    pub key_prefix: String,
}

/// Generate a new random API key.
pub fn generate_api_key() -> IssuedApiKey {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = format!("{KEY_PREFIX}{}", hex::encode(bytes));

    IssuedApiKey {
        key_hash: hash_api_key(&plaintext),
        key_prefix: plaintext[..DISPLAY_PREFIX_LEN].to_string(),
        plaintext,
    }
}

/// SHA-256 hex of a presented API key, for lookup.
pub fn hash_api_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
