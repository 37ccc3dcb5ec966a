/// Credential hashing
///
/// Passwords are stored as Argon2id PHC strings with a random salt.

use crate::store::{AdminStore, StoreError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(CredentialError::Hash)
}

/// Check `password` against a stored hash; unparsable hashes never match
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(e) => {
            tracing::debug!("stored password hash is not a PHC string: {}", e);
            false
        }
    }
}

/// Hash `password` and store it for `user`, returning the affected row count
pub async fn set_password<S: AdminStore>(
    store: &S,
    user: &str,
    password: &str,
) -> Result<u64, CredentialError> {
    let hash = hash_password(password)?;
    Ok(store.set_password_hash(user, &hash).await?)
}
