use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;
use tracing::warn;

/// Fixed salt for [`CredentialHasher::verify_absent`]; base64 of
/// "chatkeep-no-user".
const ABSENT_USER_SALT: &str = "Y2hhdGtlZXAtbm8tdXNlcg";

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),

    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
}

/// Argon2id password hasher with a fixed work factor. Hashes are PHC
/// strings, so salt and parameters travel with the hash.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    /// Argon2id with the crate's recommended parameters (19 MiB, t=2, p=1).
    pub fn new() -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default()),
        }
    }

    /// Argon2id with explicit memory (KiB), iteration and lane costs.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, HashError> {
        let params = Params::new(m_cost, t_cost, p_cost, None).map_err(HashError::Params)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(HashError::Hash)?;
        Ok(hash.to_string())
    }

    /// False on mismatch and on a stored hash that cannot be parsed.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password hash is unparsable: {}", e);
                return false;
            }
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend the same Argon2 work as [`verify`](Self::verify) when there is
    /// no stored hash to check against. Always false.
    pub fn verify_absent(&self, plaintext: &str) -> bool {
        match SaltString::from_b64(ABSENT_USER_SALT) {
            Ok(salt) => {
                let _ = self.argon2.hash_password(plaintext.as_bytes(), &salt);
            }
            Err(e) => warn!("Fixed salt is unusable: {}", e),
        }
        false
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}
