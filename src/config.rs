//! Crate-wide cryptographic and format constants.

/// Length of a derived symmetric key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Length of the per-envelope random salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the AES-GCM nonce in bytes (the envelope's `iv` field).
pub const NONCE_LEN: usize = 12;

/// Length of the AES-GCM authentication tag appended to the ciphertext.
pub const TAG_LEN: usize = 16;

/// Target wall-clock cost of a single key derivation, in milliseconds.
///
/// Chosen so that checking one password guess costs an attacker roughly
/// this much CPU time on hardware comparable to the sealing machine.
pub const TARGET_DERIVATION_MS: u64 = 100;

/// Iteration count of the timing probe used during calibration.
pub const CALIBRATION_PROBE_ROUNDS: u32 = 20_000;

/// Minimum acceptable PBKDF2 iteration count.
pub const MIN_ROUNDS: u32 = 1_000;

/// Maximum acceptable PBKDF2 iteration count.
///
/// Bounds the derivation work a hostile user table can demand. A stored
/// `rounds` value outside `[MIN_ROUNDS, MAX_ROUNDS]` is a malformed-table
/// condition.
pub const MAX_ROUNDS: u32 = 50_000_000;

/// Number of random bytes behind a generated master secret (128 bits).
pub const MASTER_SECRET_ENTROPY_LEN: usize = 16;
