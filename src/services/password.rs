//! Password hashing module
//!
//! Argon2id hashing and verification with a configurable cost. Digests are
//! PHC strings, so the parameters a hash was created with travel with it and
//! verification keeps working after the configured cost changes.

use crate::config::PasswordCost;
use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Password the decoy digest is derived from; never a real credential.
const DECOY_PASSWORD: &str = "plaja-decoy-credential";

/// Hashes and verifies user passwords.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    params: Params,
    /// Digest with the configured cost, checked when no account matches
    decoy: String,
}

impl CredentialVerifier {
    /// Build a verifier for the given cost. Fails if argon2 rejects the parameters.
    pub fn new(cost: &PasswordCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
        let mut verifier = Self {
            params,
            decoy: String::new(),
        };
        verifier.decoy = verifier
            .hash(DECOY_PASSWORD)
            .context("Failed to derive decoy digest")?;
        Ok(verifier)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
            .context("Password hashing failed")?;

        Ok(password_hash.to_string())
    }

    /// Verify a password against a stored digest.
    ///
    /// Returns `Ok(false)` on a mismatch and an error when the digest itself
    /// cannot be parsed.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
            .context("Failed to parse password hash")?;

        match self.argon2().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
                .context("Password verification error"),
        }
    }

    /// Run a full verification against the decoy digest.
    ///
    /// Used when no account matches, so an unknown email costs the same
    /// argon2 work as a wrong password.
    pub fn verify_decoy(&self, password: &str) -> bool {
        matches!(self.verify(password, &self.decoy), Ok(true))
    }
}

#[cfg(test)]
pub(crate) fn cheap_verifier() -> CredentialVerifier {
    CredentialVerifier::new(&PasswordCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap argon2 params are valid")
}
