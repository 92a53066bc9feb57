//! Password hashing with Argon2id

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// One-way hash + verify for credentials
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, password: &str) -> Result<String, HashError>;

    /// `false` for a mismatch or an unparseable stored hash.
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError>;

    /// A well-formed hash of no real password, verified against on unknown-user
    /// sign-ins so both failure paths do the same work.
    fn decoy_hash(&self) -> &str;
}

/// Argon2id hasher. Work runs on the blocking pool so hashing never stalls the runtime.
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
    decoy: String,
}

impl Argon2Hasher {
    /// OWASP minimum recommended memory cost: 19 MiB
    const MEMORY_COST: u32 = 19_456;
    const TIME_COST: u32 = 2;
    const PARALLELISM: u32 = 1;
    const OUTPUT_LEN: usize = 32;

    pub fn new() -> Result<Self, HashError> {
        Self::with_params(Self::MEMORY_COST, Self::TIME_COST, Self::PARALLELISM)
    }

    /// Cheaper parameters are handy in tests.
    pub fn with_params(memory_cost: u32, time_cost: u32, parallelism: u32) -> Result<Self, HashError> {
        let params = Params::new(memory_cost, time_cost, parallelism, Some(Self::OUTPUT_LEN))
            .map_err(|e| HashError::Hash(e.to_string()))?;
        let decoy = hash_with(&params, "decoy-password-never-issued")?;
        Ok(Self { params, decoy })
    }
}

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, password: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| HashError::Hash(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::Hash(e.to_string()))?;
    argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| HashError::Hash(e.to_string()))
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, password: &str) -> Result<String, HashError> {
        let params = self.params.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hash_with(&params, &password))
            .await
            .map_err(|e| HashError::Task(e.to_string()))?
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError> {
        let params = self.params.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed = match PasswordHash::new(&hash) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::error!("Stored password hash is unparseable: {}", e);
                    return false;
                }
            };
            // argon2 compares digests in constant time
            argon2(&params).verify_password(password.as_bytes(), &parsed).is_ok()
        })
        .await
        .map_err(|e| HashError::Task(e.to_string()))
    }

    fn decoy_hash(&self) -> &str {
        &self.decoy
    }
}
