use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{AppError, Result};
use crate::validation::auth::validate_password;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 1;
/// Salt length in bytes.
const SALT_LEN: usize = 16;
/// Salt and output of the stand-in hash used for unknown accounts. Nothing
/// hashes to it; only its cost parameters matter.
const DUMMY_SALT_B64: &str = "0tdKjsY+5etMjAzXc8jzBA";
const DUMMY_OUTPUT_B64: &str = "ecwfZkE6ThudZ5TI6lVJsUxLlTPMdw0G7Q8Sjf8JlKQ";

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: ARGON2_MEMORY_MB * 1024,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

impl HashCost {
    /// The cheapest parameters Argon2 accepts. Only for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Salted, slow, one-way password hashing with Argon2id.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: HashCost,
    dummy_hash: String,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(HashCost::default())
    }
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Self {
        let dummy_hash = format!(
            "$argon2id$v=19$m={},t={},p={}${}${}",
            cost.memory_kib, cost.iterations, cost.parallelism, DUMMY_SALT_B64, DUMMY_OUTPUT_B64
        );
        Self { cost, dummy_hash }
    }

    /// A well-formed PHC string at this hasher's cost that no password matches.
    ///
    /// Verifying against it costs the same as verifying a real credential, so
    /// a lookup miss can be made to take as long as a wrong password.
    pub fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = ParamsBuilder::new()
            .m_cost(self.cost.memory_kib)
            .t_cost(self.cost.iterations)
            .p_cost(self.cost.parallelism)
            .build()
            .map_err(|e| AppError::Hash(format!("Argon2 params: {}", e)))?;

        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }

    /// Hashes a password into a PHC string.
    ///
    /// Fails with [`AppError::Validation`] for empty or short passwords.
    pub fn hash(&self, password: &str) -> Result<String> {
        validate_password(password)?;

        let mut password_bytes = password.as_bytes().to_vec();

        let mut salt_bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt_bytes);

        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Hash(format!("Salt encoding error: {}", e)))?;

        let result = self
            .argon2()?
            .hash_password(&password_bytes, &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Hash(format!("Argon2 hash error: {}", e)));

        password_bytes.zeroize();
        salt_bytes.zeroize();
        tracing::debug!("Password hashed");
        result
    }

    /// Verifies a password against a stored hash.
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    /// The cost parameters come from the hash itself, so hashes made under
    /// older settings keep verifying.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Hash(format!("Hash parse error: {}", e)))?;

        let mut password_bytes = password.as_bytes().to_vec();
        let matches = Argon2::default()
            .verify_password(&password_bytes, &parsed_hash)
            .is_ok();

        password_bytes.zeroize();
        Ok(matches)
    }

    /// [`hash`](Self::hash) on the blocking pool.
    ///
    /// Runs to completion even if the awaiting request is dropped.
    pub async fn hash_blocking(&self, password: String) -> Result<String> {
        let hasher = self.clone();
        let password = zeroize::Zeroizing::new(password);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_blocking(&self, password: String, hash: String) -> Result<bool> {
        let hasher = self.clone();
        let password = zeroize::Zeroizing::new(password);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
    }
}
