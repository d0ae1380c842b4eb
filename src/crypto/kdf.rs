//! Password-based key derivation.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 using a per-envelope iteration
//! count. The count is calibrated when an envelope is sealed so that one
//! derivation costs about [`TARGET_DERIVATION_MS`] of wall-clock time on the
//! sealing machine, and the calibrated value is stored in the envelope.
//! Verification on any machine replays the stored count rather than
//! recalibrating, so an envelope keeps its intended cost as it migrates
//! across hardware of different speed.

use std::time::Instant;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::{
    CALIBRATION_PROBE_ROUNDS, KEY_LEN, MAX_ROUNDS, MIN_ROUNDS, TARGET_DERIVATION_MS,
};
use crate::error::{Result, VaultError};

/// Derives a 256-bit symmetric key from a password, salt, and iteration
/// count.
///
/// Deterministic: the same inputs always produce the same key. The returned
/// key is zeroized when dropped.
///
/// # Errors
///
/// Returns [`VaultError::InvalidParameter`] if the password or salt is
/// empty, or if `rounds` is outside `[MIN_ROUNDS, MAX_ROUNDS]`.
pub fn derive_key(password: &str, salt: &[u8], rounds: u32) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if password.is_empty() {
        return Err(VaultError::InvalidParameter(
            "password must not be empty".into(),
        ));
    }
    if salt.is_empty() {
        return Err(VaultError::InvalidParameter("salt must not be empty".into()));
    }
    if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&rounds) {
        return Err(VaultError::InvalidParameter(format!(
            "rounds {rounds} is out of range [{MIN_ROUNDS}, {MAX_ROUNDS}]"
        )));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut key[..]);
    Ok(key)
}

/// Finds the iteration count at which one derivation takes roughly
/// [`TARGET_DERIVATION_MS`] on this machine.
///
/// Times a probe derivation at [`CALIBRATION_PROBE_ROUNDS`] iterations and
/// scales linearly to the target, clamping into the valid range. The result
/// varies by machine; callers store it alongside the envelope and replay the
/// stored value at verification time.
///
/// # Errors
///
/// Returns [`VaultError::InvalidParameter`] if the password or salt is
/// empty.
pub fn calibrate_rounds(password: &str, salt: &[u8]) -> Result<u32> {
    let start = Instant::now();
    derive_key(password, salt, CALIBRATION_PROBE_ROUNDS)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1_000.0;

    // A sub-resolution probe measurement clamps through MAX_ROUNDS.
    let scaled = if elapsed_ms > 0.0 {
        (f64::from(CALIBRATION_PROBE_ROUNDS) * TARGET_DERIVATION_MS as f64 / elapsed_ms) as u64
    } else {
        u64::from(MAX_ROUNDS)
    };

    Ok(scaled.clamp(u64::from(MIN_ROUNDS), u64::from(MAX_ROUNDS)) as u32)
}
