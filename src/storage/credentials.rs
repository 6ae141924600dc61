//! Password digests.
//!
//! Argon2id, stored as a PHC string (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
//! The cost parameters travel with the digest, so changing the configured
//! cost only affects new registrations. The raw password is never stored.

use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Argon2 passes used when none is configured.
pub const DEFAULT_ITERATIONS: u32 = Params::DEFAULT_T_COST;

/// Argon2 memory cost in KiB used when none is configured.
pub const DEFAULT_MEMORY_KIB: u32 = Params::DEFAULT_M_COST;

/// Produce a storable digest for `password` with a fresh random salt.
///
/// Costs below Argon2's minimums are raised to them.
pub fn hash_password(password: &str, iterations: u32, memory_kib: u32) -> Result<String> {
    let params = Params::new(
        memory_kib.max(Params::MIN_M_COST),
        iterations.max(Params::MIN_T_COST),
        Params::DEFAULT_P_COST,
        None,
    )
    .map_err(|e| anyhow!("argon2 params: {e}"))?;
    let salt = SaltString::generate(&mut rand::thread_rng());
    let digest = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("argon2: {e}"))?;
    Ok(digest.to_string())
}

/// Check `password` against a stored digest. Malformed digests never match.
pub fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
