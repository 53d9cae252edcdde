//! Password hashing for registered identities.

use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::{Params, Scrypt};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid password hash parameters")]
    Params,
    #[error("password hashing failed: {0}")]
    Hash(scrypt::password_hash::Error),
}

impl From<scrypt::password_hash::Error> for IdentityError {
    fn from(err: scrypt::password_hash::Error) -> Self {
        IdentityError::Hash(err)
    }
}

/// Hash `password` into a PHC string with a random salt.
pub fn hash_password(password: &str, cost: u8) -> Result<String, IdentityError> {
    let params = Params::new(
        cost,
        Params::RECOMMENDED_R,
        Params::RECOMMENDED_P,
        Params::RECOMMENDED_LEN,
    )
    .map_err(|_| IdentityError::Params)?;
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let hash = Scrypt.hash_password_customized(password.as_bytes(), None, None, params, &salt)?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC string. Unparseable hashes never
/// verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Scrypt
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter2", 4).unwrap();
        assert!(hash.starts_with("$scrypt$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let first = hash_password("same", 4).unwrap();
        let second = hash_password("same", 4).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_garbage_hash_does_not_verify() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
