use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

use super::error::AuthError;

const MEMORY_COST_KIB: u32 = 65536;
const TIME_COST: u32 = 1;
const PARALLELISM: u32 = 4;
const OUTPUT_LENGTH: usize = 32;

#[tracing::instrument(name = "compute password hash", skip_all)]
pub fn compute_password_hash(password: SecretString) -> Result<String, Error> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LENGTH))
        .map_err(|e| Error::Other(e.into()))?;
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| Error::Auth(AuthError::PasswordError(e)))?
        .to_string();

    Ok(password_hash)
}

/// Parameters are read from the PHC string, so hashes made with other
/// settings still verify.
#[tracing::instrument(name = "verify password hash", skip_all)]
pub fn verify_password_hash(password_hashed: String, password: SecretString) -> Result<(), Error> {
    let expected_password_hash = PasswordHash::new(&password_hashed)
        .map_err(|e| Error::Auth(AuthError::PasswordError(e)))?;

    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &expected_password_hash)
        .map_err(|e| Error::Auth(AuthError::PasswordError(e)))
}
