//! Password hashing and verification using Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::MarketError;

/// Hash a password, returning a PHC-formatted string that embeds the
/// salt and parameters.
pub fn hash_password(password: &str) -> Result<String, MarketError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MarketError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// Returns true if the password matches the hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, MarketError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| MarketError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_rejects_wrong_password() {
        let hash = hash_password("satchel-midterm-2026").unwrap();

        // PHC format with embedded salt and parameters
        assert!(hash.starts_with("$argon2"));

        assert!(verify_password("satchel-midterm-2026", &hash).unwrap());
        assert!(!verify_password("satchel-midterm-2025", &hash).unwrap());
    }

    #[test]
    fn test_fresh_salt_per_hash() {
        let h1 = hash_password("shared-study-group-secret").unwrap();
        let h2 = hash_password("shared-study-group-secret").unwrap();

        // Two users picking the same password never share a hash
        assert_ne!(h1, h2);
        assert!(verify_password("shared-study-group-secret", &h1).unwrap());
        assert!(verify_password("shared-study-group-secret", &h2).unwrap());
    }

    #[test]
    fn test_malformed_stored_hash_is_an_error() {
        assert!(verify_password("anything", "plaintext-from-an-old-import").is_err());
    }
}
