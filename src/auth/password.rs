//! Argon2id password hashing (PHC strings).

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

pub fn hash_password(plain: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| HashError(e.to_string()))
}

/// False for a wrong password and for a stored value that is not a PHC hash.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Whether a value is already an Argon2 PHC hash, so hooks do not hash twice.
pub fn is_hashed(value: &str) -> bool {
    PasswordHash::new(value).is_ok_and(|h| h.algorithm.as_str().starts_with("argon2"))
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(plain: String) -> Result<String, HashError> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| HashError(e.to_string()))?
}

/// [`verify_password`] on the blocking pool. A failed task counts as a mismatch.
pub async fn verify_password_blocking(plain: String, stored: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&plain, &stored))
        .await
        .unwrap_or(false)
}
