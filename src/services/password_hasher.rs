use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tokio::task;

use crate::config::SecurityConfig;

/// Argon2id hashing and verification. Hashes are opaque strings; no other
/// component parses them. Hashing is CPU-bound and intentionally slow, so the
/// async wrappers run it on the blocking pool and callers must not hold it
/// under any lock shared across users.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut hasher = Self {
            argon2,
            dummy_hash: String::new(),
        };
        // Computed once at boot so unknown-username logins can burn the same
        // verification cost as a real mismatch.
        hasher.dummy_hash = hasher.hash("kadro-timing-equalizer")?;

        Ok(hasher)
    }

    /// Salted hash; every call produces a distinct salt.
    pub fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    /// Constant-time with respect to the stored hash; unparsable hashes
    /// verify as false.
    #[must_use]
    pub fn verify(&self, plain: &str, stored: &str) -> bool {
        PasswordHash::new(stored)
            .map(|parsed| {
                self.argon2
                    .verify_password(plain.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub async fn hash_async(&self, plain: String) -> Result<String> {
        let hasher = self.clone();
        task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("Password hashing task panicked")?
    }

    pub async fn verify_async(&self, plain: String, stored: String) -> Result<bool> {
        let hasher = self.clone();
        task::spawn_blocking(move || hasher.verify(&plain, &stored))
            .await
            .context("Password verification task panicked")
    }

    /// Burns one verification against the boot-time dummy hash so an unknown
    /// username is indistinguishable from a failed hash check by timing.
    pub async fn equalize_timing(&self, plain: String) {
        let dummy = self.dummy_hash.clone();
        let _ = self.verify_async(plain, dummy).await;
    }
}
