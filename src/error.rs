//! Crate error types.
//!
//! Every fallible operation returns [`VaultError`] through the [`Result`]
//! alias. Backend-originated failures always carry the backend's captured
//! diagnostic output; I/O failures carry the underlying `io::Error`.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors surfaced by envelope, user table, and volume lifecycle operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The volume backend failed to create the encrypted volume image.
    #[error("volume creation failed: {message}")]
    Creation {
        /// What went wrong.
        message: String,
        /// Diagnostic output captured from the backend, if any.
        diagnostic: Option<String>,
    },

    /// The volume could not be attached, or is already attached.
    #[error("volume attachment failed: {message}")]
    Attachment {
        /// What went wrong.
        message: String,
        /// Diagnostic output captured from the backend, if any.
        diagnostic: Option<String>,
    },

    /// The volume could not be detached, or is not attached.
    #[error("volume detachment failed: {message}")]
    Detachment {
        /// What went wrong.
        message: String,
        /// Diagnostic output captured from the backend, if any.
        diagnostic: Option<String>,
    },

    /// The username does not exist or the password is wrong.
    ///
    /// The two cases are deliberately not distinguished, so that failed
    /// attempts do not reveal which usernames exist.
    #[error("unknown user or wrong password")]
    Authentication,

    /// The persisted user table is structurally invalid.
    #[error("malformed user table: {0}")]
    MalformedUserTable(String),

    /// The user table could not be written to disk.
    #[error("failed to write user table: {message}")]
    UserTableWriteFailed {
        /// What went wrong.
        message: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The wrapper metadata document is missing or invalid.
    #[error("malformed wrapper metadata: {0}")]
    MalformedMetadata(String),

    /// An argument failed validation before any work was attempted.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl VaultError {
    /// Builds a [`VaultError::Creation`] from a message and optional
    /// backend diagnostic text.
    pub fn creation(message: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self::Creation {
            message: message.into(),
            diagnostic,
        }
    }

    /// Builds a [`VaultError::Attachment`] from a message and optional
    /// backend diagnostic text.
    pub fn attachment(message: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self::Attachment {
            message: message.into(),
            diagnostic,
        }
    }

    /// Builds a [`VaultError::Detachment`] from a message and optional
    /// backend diagnostic text.
    pub fn detachment(message: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self::Detachment {
            message: message.into(),
            diagnostic,
        }
    }
}
