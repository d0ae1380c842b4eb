//! Sealed per-user credential records.
//!
//! A [`CredentialEnvelope`] holds one user's encrypted copy of the volume's
//! master secret. Every envelope carries its own random salt, calibrated
//! iteration count, and random nonce, so envelopes for the same secret and
//! even the same password never repeat derivation or cipher parameters.
//!
//! # Security Design
//!
//! - The secret is encrypted with AES-256-GCM under a key derived from the
//!   user's password and the envelope's own salt/rounds.
//! - The GCM tag (carried at the end of `ciphertext`) authenticates the
//!   record: a wrong password or a bit flip anywhere in the stored fields
//!   fails decryption instead of yielding corrupted plaintext.
//! - The owning username is bound as associated data, so an envelope copied
//!   under a different username fails authentication as well.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::{MAX_ROUNDS, MIN_ROUNDS, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::crypto::kdf;
use crate::error::{Result, VaultError};

/// Domain-separation label mixed into every envelope's associated data.
const AAD_LABEL: &[u8] = b"encvault:credential-envelope:v1:";

/// One user's sealed copy of the master secret.
///
/// Opaque to everything except [`seal`](Self::seal) and
/// [`open`](Self::open). In the persisted user table the binary fields are
/// base64 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEnvelope {
    /// Random per-envelope salt for key derivation.
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,

    /// PBKDF2 iteration count, calibrated once when the envelope was sealed.
    pub rounds: u32,

    /// Random AES-GCM nonce.
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,

    /// Encrypted master secret followed by the authentication tag.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl CredentialEnvelope {
    /// Seals `secret` under `password`, binding the envelope to `aad`
    /// (the owning username).
    ///
    /// Generates a fresh random salt and nonce and calibrates the iteration
    /// count on the current machine, so sealing blocks for roughly the
    /// derivation target time.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidParameter`] if the password is empty or
    /// encryption fails.
    pub fn seal(secret: &[u8], password: &str, aad: &[u8]) -> Result<Self> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut iv = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);

        let rounds = kdf::calibrate_rounds(password, &salt)?;
        let key = kdf::derive_key(password, &salt, rounds)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: secret,
                    aad: &envelope_aad(aad),
                },
            )
            .map_err(|_| VaultError::InvalidParameter("encryption failed".into()))?;

        Ok(Self {
            salt,
            rounds,
            iv,
            ciphertext,
        })
    }

    /// Recovers the sealed secret using `password` and the envelope's own
    /// salt, rounds, and nonce.
    ///
    /// The returned buffer is zeroized when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Authentication`] when the password is wrong,
    /// the `aad` does not match the one the envelope was sealed with, or any
    /// stored field is malformed or tampered with.
    pub fn open(&self, password: &str, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if self.iv.len() != NONCE_LEN {
            return Err(VaultError::Authentication);
        }

        let key =
            kdf::derive_key(password, &self.salt, self.rounds).map_err(|_| VaultError::Authentication)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&self.iv),
                Payload {
                    msg: &self.ciphertext,
                    aad: &envelope_aad(aad),
                },
            )
            .map_err(|_| VaultError::Authentication)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Checks structural validity of a deserialized envelope.
    ///
    /// Cheap field checks only; no key derivation happens here.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.salt.is_empty() {
            return Err("empty salt".into());
        }
        if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&self.rounds) {
            return Err(format!(
                "rounds {} is out of range [{MIN_ROUNDS}, {MAX_ROUNDS}]",
                self.rounds
            ));
        }
        if self.iv.len() != NONCE_LEN {
            return Err(format!(
                "initialization vector is {} bytes, expected {NONCE_LEN}",
                self.iv.len()
            ));
        }
        if self.ciphertext.len() < TAG_LEN {
            return Err(format!(
                "ciphertext is {} bytes, shorter than the authentication tag",
                self.ciphertext.len()
            ));
        }
        Ok(())
    }
}

/// Prefixes the caller-supplied associated data with the format label.
fn envelope_aad(aad: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(AAD_LABEL.len() + aad.len());
    full.extend_from_slice(AAD_LABEL);
    full.extend_from_slice(aad);
    full
}

/// Serde adapter encoding binary fields as base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
