//! Multi-user access to one shared encrypted volume.
//!
//! Each authorized user holds their own password; no password is ever shared.
//! A per-user [`CredentialEnvelope`] seals the volume's single master secret
//! under a key derived from that user's password, so any user's password
//! recovers the same secret, and users can be added or revoked without
//! re-encrypting the volume. The [`EncryptedVolumeWrapper`] recovers the
//! secret from a `(username, password)` pair and drives an external
//! [`VolumeBackend`] through the attach/detach lifecycle.
//!
//! # Security Design
//!
//! - Key derivation is PBKDF2-HMAC-SHA256 with a per-envelope iteration
//!   count calibrated to ~100 ms at seal time; the calibrated count is
//!   stored in the envelope and replayed at verification time, so a guess
//!   costs the attacker the same derivation work.
//! - Envelopes are sealed with AES-256-GCM. The authentication tag rejects
//!   wrong passwords and any tampering with the stored fields; the owning
//!   username is bound as associated data.
//! - Salts and nonces are freshly random per envelope, never reused.
//! - The master secret lives in a zeroize-on-drop wrapper, is held only for
//!   the duration of a single create/attach/set-password operation, and is
//!   never logged or persisted in the clear.
//!
//! All operations are blocking and a wrapper instance is single-threaded by
//! design; callers needing concurrency serialize access externally.
//!
//! # Example
//!
//! ```no_run
//! use encvault::{EncryptedVolumeWrapper, MasterSecret, VolumeOptions};
//!
//! # fn main() -> encvault::Result<()> {
//! let mut wrapper = EncryptedVolumeWrapper::create(
//!     "/Volumes/team/payroll.vault",
//!     MasterSecret::generate(),
//!     "alice",
//!     "wonderland",
//!     &VolumeOptions::new("100m").with_volume_name("Payroll"),
//! )?;
//!
//! wrapper.attach("alice", "wonderland", "/Volumes/payroll")?;
//! // ... use the mounted volume ...
//! wrapper.detach()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod volume;

pub use crypto::{CredentialEnvelope, MasterSecret};
pub use error::{Result, VaultError};
pub use volume::{EncryptedVolumeWrapper, HdiutilBackend, UserTable, VolumeBackend, VolumeOptions};
