//! Slow-hash collaborator and device fingerprinting.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sha2::{Digest, Sha256};

/// Device fingerprints are a fuzzy identity signal, not a credential; a
/// truncated digest keeps them short and collisions are acceptable.
const FINGERPRINT_HEX_LEN: usize = 16;

/// Slow, salted one-way hash collaborator used for password reuse checks.
/// The credential-verification step of the login flow uses the same
/// provider outside this engine.
pub trait PasswordHashProvider: Send + Sync {
    /// Hash a password for storage.
    fn hash(&self, password: &str) -> Result<String, anyhow::Error>;

    /// Verify a candidate against a stored digest. Implementations must
    /// compare in constant time; never string equality on secret material.
    fn verify(&self, password: &str, digest: &str) -> bool;
}

/// Production provider backed by Argon2id with a random salt per hash.
#[derive(Debug, Clone, Default)]
pub struct Argon2HashProvider;

impl PasswordHashProvider for Argon2HashProvider {
    fn hash(&self, password: &str) -> Result<String, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            // Stored digests come from this provider; a parse failure means
            // foreign or corrupt data, which can never match.
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Derive the stable device fingerprint for a session: a truncated SHA-256
/// of `ip + "-" + user_agent`.
pub fn device_fingerprint(ip_address: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{}-{}", ip_address, user_agent).as_bytes());
    let mut fp = hex::encode(digest);
    fp.truncate(FINGERPRINT_HEX_LEN);
    fp
}
