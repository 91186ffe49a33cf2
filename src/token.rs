//! Credential hashing for edit and delete tokens
//!
//! Tokens are stored as Argon2id PHC strings. Values that do not start with
//! `$argon2` are legacy plaintext tokens written before hashing existed.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use log::{debug, warn};
use rand::RngCore;
use thiserror::Error;
use uuid::Uuid;

/// Prefix shared by every Argon2 PHC string
pub const HASH_PREFIX: &str = "$argon2";

const TIME_COST: u32 = 2;
const MEMORY_COST_KIB: u32 = 19_456;
const PARALLELISM: u32 = 1;
const HASH_LEN: usize = 32;
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token must be a non-empty string")]
    Empty,

    #[error("token hashing failed: {0}")]
    Hash(String),
}

fn hasher() -> Result<Argon2<'static>, TokenError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(HASH_LEN))
        .map_err(|e| TokenError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext token into an Argon2id PHC string with a random salt.
pub fn hash_token(token: &str) -> Result<String, TokenError> {
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| TokenError::Hash(e.to_string()))?;

    let hash = hasher()?
        .hash_password(token.as_bytes(), &salt)
        .map_err(|e| TokenError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a plaintext token against a stored digest.
///
/// Empty input, malformed digests and non-Argon2id digests never verify.
pub fn verify_token(token: &str, digest: &str) -> bool {
    if token.is_empty() || digest.is_empty() {
        return false;
    }

    let parsed = match PasswordHash::new(digest) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Malformed token digest: {}", e);
            return false;
        }
    };
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        warn!("Token digest uses unexpected algorithm {}", parsed.algorithm);
        return false;
    }

    let hasher = match hasher() {
        Ok(hasher) => hasher,
        Err(e) => {
            warn!("Token verification unavailable: {}", e);
            return false;
        }
    };
    if hasher.verify_password(token.as_bytes(), &parsed).is_err() {
        return false;
    }

    if needs_rehash(&parsed) {
        warn!("Token digest uses outdated parameters and should be rehashed");
    }
    true
}

fn needs_rehash(parsed: &PasswordHash<'_>) -> bool {
    match Params::try_from(parsed) {
        Ok(params) => {
            params.m_cost() != MEMORY_COST_KIB
                || params.t_cost() != TIME_COST
                || params.p_cost() != PARALLELISM
        }
        Err(_) => true,
    }
}

/// Whether a stored value is a digest rather than legacy plaintext.
pub fn is_token_hashed(value: &str) -> bool {
    value.starts_with(HASH_PREFIX)
}

/// A fresh one-time credential: 32 lowercase hex characters.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
