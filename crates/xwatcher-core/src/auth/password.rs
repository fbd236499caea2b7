//! Password hashing and verification.
//!
//! Passwords are hashed with bcrypt. Bcrypt silently truncates inputs at
//! 72 bytes, so longer inputs are pre-hashed with SHA-256 (hex-encoded)
//! before being fed to bcrypt. Verification applies the same rule, so both
//! sides always see the same bytes.

use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Bcrypt cost factor (12 = ~250ms on modern hardware).
const BCRYPT_COST: u32 = 12;

/// Inputs longer than this many bytes are pre-hashed before bcrypt.
const BCRYPT_MAX_BYTES: usize = 72;

fn prehash_if_needed(password: &str) -> String {
    if password.len() > BCRYPT_MAX_BYTES {
        hex::encode(Sha256::digest(password.as_bytes()))
    } else {
        password.to_string()
    }
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let input = prehash_if_needed(password);
    bcrypt::hash(&input, BCRYPT_COST).map_err(|e| AuthError::Hash {
        message: e.to_string(),
    })
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let input = prehash_if_needed(password);
    bcrypt::verify(&input, hash).map_err(|e| AuthError::Hash {
        message: e.to_string(),
    })
}
