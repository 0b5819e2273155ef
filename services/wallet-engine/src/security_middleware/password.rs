//! Argon2id hashing for passwords and MPINs.

use crate::errors::{Result, WalletError};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

/// Hash a secret into a PHC string. Runs on the blocking pool.
pub async fn hash_secret(secret: &str) -> Result<String> {
    let secret = secret.to_string();
    tokio::task::spawn_blocking(move || hash_secret_blocking(&secret))
        .await
        .map_err(|e| WalletError::Internal(format!("hashing task failed: {}", e)))?
}

/// Check a secret against a stored PHC string. Runs on the blocking pool.
pub async fn verify_secret(secret: &str, phc: &str) -> Result<bool> {
    let (secret, phc) = (secret.to_string(), phc.to_string());
    tokio::task::spawn_blocking(move || verify_secret_blocking(&secret, &phc))
        .await
        .map_err(|e| WalletError::Internal(format!("verification task failed: {}", e)))?
}

fn hash_secret_blocking(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_secret_blocking(secret: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc)?;
    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_secret("123456").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("123456", &hash).await.unwrap());
        assert!(!verify_secret("654321", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let a = hash_secret("same").await.unwrap();
        let b = hash_secret("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_garbage_hash_is_an_error() {
        assert!(verify_secret("x", "not-a-phc-string").await.is_err());
    }
}
