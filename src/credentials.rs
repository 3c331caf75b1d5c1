//! Password hashing, API key issuance and key comparison.

use crate::error::{ControlError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Argon2id hash in PHC string form (`$argon2id$v=19$...`), salt embedded.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| ControlError::Credential(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ControlError::Credential(e.to_string()))
}

/// Anything that is not a parseable PHC string never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Opaque random API key: 16 random bytes, hex encoded.
pub fn generate_api_key() -> String {
    let mut b = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut b);
    hex::encode(b)
}

/// Compare a presented key with the stored one in constant time.
pub fn api_key_matches(stored: Option<&str>, presented: &str) -> bool {
    match stored {
        Some(stored) => bool::from(stored.as_bytes().ct_eq(presented.as_bytes())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let stored = hash_password("hunter2").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn same_password_gets_different_salts() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "md5$00$abc"));
        assert!(!verify_password("pw", "sha256$00$abc"));
        assert!(!verify_password("pw", "$argon2id$v=19$garbage"));
    }

    #[test]
    fn api_keys_are_32_hex_chars() {
        let key = generate_api_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn api_key_comparison() {
        let key = generate_api_key();
        assert!(api_key_matches(Some(&key), &key));
        assert!(!api_key_matches(Some(&key), &key[..31]));
        assert!(!api_key_matches(Some(&key), ""));
        assert!(!api_key_matches(None, ""));
        assert!(!api_key_matches(None, &key));
    }
}
