//! Persisted username → credential envelope table.
//!
//! The table is the only durable record of who can unlock the volume. Each
//! entry independently seals the same master secret, so adding or removing a
//! user never touches other entries or the volume itself. An empty table is
//! legal but leaves the volume unopenable through this mechanism.
//!
//! On disk the table is a JSON document: a top-level object mapping each
//! username to its envelope record, with binary fields base64-encoded.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::crypto::{CredentialEnvelope, MasterSecret};
use crate::error::{Result, VaultError};

/// Mapping from username to that user's sealed copy of the master secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserTable {
    users: HashMap<String, CredentialEnvelope>,
}

impl UserTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seals `master_secret` under `password` and inserts or replaces the
    /// entry for `user`.
    ///
    /// Replacing an existing entry discards the old envelope, which
    /// invalidates that user's previous password immediately; the old
    /// password is not required. Sealing calibrates the key derivation on
    /// this machine, so the call blocks for roughly the derivation target
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidParameter`] if the username or password
    /// is empty.
    pub fn set_password(
        &mut self,
        user: &str,
        password: &str,
        master_secret: &MasterSecret,
    ) -> Result<()> {
        if user.is_empty() {
            return Err(VaultError::InvalidParameter(
                "username must not be empty".into(),
            ));
        }

        let envelope = CredentialEnvelope::seal(master_secret.as_bytes(), password, user.as_bytes())?;
        self.users.insert(user.to_owned(), envelope);
        debug!("set password for user {user:?}");
        Ok(())
    }

    /// Removes the entry for `user`; a no-op if the user is absent.
    ///
    /// Other users' envelopes and the master secret itself are unaffected.
    pub fn remove_user(&mut self, user: &str) {
        if self.users.remove(user).is_some() {
            debug!("removed user {user:?}");
        }
    }

    /// Recovers the master secret from a username and password.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Authentication`] when the user is unknown or
    /// the password is wrong; the two cases are indistinguishable.
    pub fn recover_master_secret(&self, user: &str, password: &str) -> Result<MasterSecret> {
        let envelope = self.users.get(user).ok_or(VaultError::Authentication)?;
        let plaintext = envelope.open(password, user.as_bytes())?;
        let secret = std::str::from_utf8(&plaintext).map_err(|_| VaultError::Authentication)?;
        Ok(MasterSecret::new(secret))
    }

    /// Returns whether `user` has an entry.
    pub fn contains_user(&self, user: &str) -> bool {
        self.users.contains_key(user)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Serializes the table to its persisted JSON representation.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| VaultError::MalformedUserTable(format!("serialization failed: {err}")))
    }

    /// Deserializes a table from its persisted representation.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedUserTable`] on structurally invalid
    /// input: unparseable JSON, missing envelope fields, an empty username,
    /// or field values out of range.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let table: Self = serde_json::from_slice(bytes)
            .map_err(|err| VaultError::MalformedUserTable(err.to_string()))?;

        for (user, envelope) in &table.users {
            if user.is_empty() {
                return Err(VaultError::MalformedUserTable("empty username".into()));
            }
            envelope
                .validate()
                .map_err(|reason| VaultError::MalformedUserTable(format!("user {user:?}: {reason}")))?;
        }
        Ok(table)
    }

    /// Writes the table to `path` atomically.
    ///
    /// The serialized table goes to a temporary file in the target's
    /// directory, is synced, and is then renamed into place, so a crash
    /// mid-write never corrupts a previously valid table.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::UserTableWriteFailed`] with the underlying I/O
    /// cause when the temporary file cannot be created, written, or renamed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.serialize()?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(directory).map_err(|err| {
            VaultError::UserTableWriteFailed {
                message: format!("cannot create temporary file in {}", directory.display()),
                source: err,
            }
        })?;
        temp.write_all(&bytes)
            .map_err(|err| VaultError::UserTableWriteFailed {
                message: format!("cannot write temporary file {}", temp.path().display()),
                source: err,
            })?;
        temp.as_file()
            .sync_all()
            .map_err(|err| VaultError::UserTableWriteFailed {
                message: format!("cannot sync temporary file {}", temp.path().display()),
                source: err,
            })?;
        temp.persist(path)
            .map_err(|err| VaultError::UserTableWriteFailed {
                message: format!("cannot rename into {}", path.display()),
                source: err.error,
            })?;

        debug!("saved user table with {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Reads and deserializes the table at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedUserTable`] when the file cannot be
    /// read or its contents are structurally invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| {
            VaultError::MalformedUserTable(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::deserialize(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> MasterSecret {
        MasterSecret::new("M4sterSecret")
    }

    #[test]
    fn test_multi_user_equivalence() {
        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();
        table.set_password("bob", "builders", &master).unwrap();

        let from_alice = table.recover_master_secret("alice", "wonderland").unwrap();
        let from_bob = table.recover_master_secret("bob", "builders").unwrap();
        assert_eq!(from_alice.expose(), master.expose());
        assert_eq!(from_bob.expose(), master.expose());
    }

    #[test]
    fn test_replace_invalidates_old_password() {
        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "old password", &master).unwrap();
        table.set_password("alice", "new password", &master).unwrap();

        assert_eq!(table.len(), 1);
        assert!(matches!(
            table.recover_master_secret("alice", "old password"),
            Err(VaultError::Authentication)
        ));
        let recovered = table.recover_master_secret("alice", "new password").unwrap();
        assert_eq!(recovered.expose(), master.expose());
    }

    #[test]
    fn test_revocation() {
        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();
        table.set_password("bob", "builders", &master).unwrap();

        table.remove_user("alice");
        assert!(matches!(
            table.recover_master_secret("alice", "wonderland"),
            Err(VaultError::Authentication)
        ));
        // bob is unaffected
        let recovered = table.recover_master_secret("bob", "builders").unwrap();
        assert_eq!(recovered.expose(), master.expose());

        // removing again is a no-op
        table.remove_user("alice");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_user_fails() {
        let table = UserTable::new();
        assert!(matches!(
            table.recover_master_secret("nobody", "anything"),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn test_wrong_password_fails() {
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &secret()).unwrap();
        assert!(matches!(
            table.recover_master_secret("alice", "looking glass"),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn test_set_password_rejects_empty_inputs() {
        let mut table = UserTable::new();
        assert!(matches!(
            table.set_password("", "password", &secret()),
            Err(VaultError::InvalidParameter(_))
        ));
        assert!(matches!(
            table.set_password("alice", "", &secret()),
            Err(VaultError::InvalidParameter(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();
        table.set_password("bob", "builders", &master).unwrap();

        let bytes = table.serialize().unwrap();
        let restored = UserTable::deserialize(&bytes).unwrap();

        assert_eq!(restored.len(), 2);
        let from_alice = restored.recover_master_secret("alice", "wonderland").unwrap();
        let from_bob = restored.recover_master_secret("bob", "builders").unwrap();
        assert_eq!(from_alice.expose(), master.expose());
        assert_eq!(from_bob.expose(), master.expose());
    }

    #[test]
    fn test_deserialize_rejects_invalid_json() {
        let result = UserTable::deserialize(b"not json at all");
        assert!(matches!(result, Err(VaultError::MalformedUserTable(_))));
    }

    #[test]
    fn test_deserialize_rejects_missing_field() {
        // envelope record without an iv
        let json = br#"{"alice": {"salt": "AAAAAAAAAAAAAAAAAAAAAA==", "rounds": 100000, "ciphertext": "AAAA"}}"#;
        let result = UserTable::deserialize(json);
        assert!(matches!(result, Err(VaultError::MalformedUserTable(_))));
    }

    #[test]
    fn test_deserialize_rejects_out_of_range_rounds() {
        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();

        let json = String::from_utf8(table.serialize().unwrap()).unwrap();
        let low = json.replacen(&format!("\"rounds\": {}", rounds_of(&table)), "\"rounds\": 1", 1);
        let result = UserTable::deserialize(low.as_bytes());
        assert!(matches!(result, Err(VaultError::MalformedUserTable(_))));
    }

    #[test]
    fn test_deserialize_rejects_wrong_iv_length() {
        let json = br#"{"alice": {"salt": "AAAAAAAAAAAAAAAAAAAAAA==", "rounds": 100000, "iv": "AAAA", "ciphertext": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}}"#;
        let result = UserTable::deserialize(json);
        assert!(matches!(result, Err(VaultError::MalformedUserTable(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();
        table.save(&path).unwrap();

        let restored = UserTable::load(&path).unwrap();
        let recovered = restored.recover_master_secret("alice", "wonderland").unwrap();
        assert_eq!(recovered.expose(), master.expose());
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();
        table.save(&path).unwrap();

        table.set_password("bob", "builders", &master).unwrap();
        table.save(&path).unwrap();

        let restored = UserTable::load(&path).unwrap();
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("users.json");

        let table = UserTable::new();
        let result = table.save(&path);
        assert!(matches!(
            result,
            Err(VaultError::UserTableWriteFailed { .. })
        ));
    }

    #[test]
    fn test_failed_save_leaves_previous_table_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let master = secret();
        let mut table = UserTable::new();
        table.set_password("alice", "wonderland", &master).unwrap();
        table.save(&path).unwrap();

        // Saving through a path whose parent vanished fails without
        // touching the existing file.
        let gone = dir.path().join("gone").join("users.json");
        assert!(table.save(&gone).is_err());

        let restored = UserTable::load(&path).unwrap();
        assert!(restored.contains_user("alice"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = UserTable::load(&dir.path().join("users.json"));
        assert!(matches!(result, Err(VaultError::MalformedUserTable(_))));
    }

    fn rounds_of(table: &UserTable) -> u32 {
        table.users.values().next().unwrap().rounds
    }
}
