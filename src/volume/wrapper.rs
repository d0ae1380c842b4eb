//! Encrypted volume wrapper lifecycle.
//!
//! A wrapper is a directory holding three artifacts: the metadata document,
//! the user table, and the backend's encrypted volume image. The wrapper
//! recovers the master secret from a username and password, drives the
//! volume backend with it, and tracks the single attach/detach state
//! transition.
//!
//! A wrapper instance is not safe for concurrent use; callers needing
//! shared access must serialize externally. Two instances opened on the same
//! wrapper directory are independent in memory and share only the on-disk
//! files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::crypto::MasterSecret;
use crate::error::{Result, VaultError};
use crate::volume::backend::{HdiutilBackend, VolumeBackend, VolumeOptions};
use crate::volume::metadata::WrapperMetadata;
use crate::volume::user_table::UserTable;

/// File name of the metadata document inside a wrapper directory.
const METADATA_FILE: &str = "wrapper.json";

/// File name of the user table inside a wrapper directory.
const USER_TABLE_FILE: &str = "users.json";

/// File name of the backend volume image inside a wrapper directory.
const VOLUME_IMAGE_FILE: &str = "volume.dmg";

/// Multi-user wrapper around one encrypted volume.
///
/// Starts `Unattached`; [`attach`](Self::attach) and
/// [`detach`](Self::detach) move it between the two states. The master
/// secret is recovered per operation and dropped (zeroized) as soon as the
/// operation completes, successfully or not.
pub struct EncryptedVolumeWrapper {
    wrapper_path: PathBuf,
    volume_image_path: PathBuf,
    user_table_path: PathBuf,
    user_table: UserTable,
    mount_point: Option<PathBuf>,
    backend: Box<dyn VolumeBackend>,
}

impl EncryptedVolumeWrapper {
    /// Creates a new encrypted volume wrapper at `path` using the default
    /// [`HdiutilBackend`].
    ///
    /// See [`create_with_backend`](Self::create_with_backend).
    pub fn create(
        path: impl Into<PathBuf>,
        master_secret: MasterSecret,
        user: &str,
        password: &str,
        options: &VolumeOptions,
    ) -> Result<Self> {
        Self::create_with_backend(path, master_secret, user, password, options, Box::new(HdiutilBackend))
    }

    /// Creates a new encrypted volume wrapper at `path`.
    ///
    /// The backend materializes the volume image first; on its failure
    /// nothing is persisted and the error carries the backend's diagnostic.
    /// On success a user table with exactly one entry, `user` sealing the
    /// master secret under `password`, is persisted along with the
    /// metadata document, and the wrapper is returned unattached.
    ///
    /// The master secret is consumed and zeroized before this returns.
    pub fn create_with_backend(
        path: impl Into<PathBuf>,
        master_secret: MasterSecret,
        user: &str,
        password: &str,
        options: &VolumeOptions,
        backend: Box<dyn VolumeBackend>,
    ) -> Result<Self> {
        let wrapper_path = path.into();
        fs::create_dir_all(&wrapper_path).map_err(|err| {
            VaultError::creation(
                format!(
                    "cannot create wrapper directory {}: {err}",
                    wrapper_path.display()
                ),
                None,
            )
        })?;

        let volume_image_path = wrapper_path.join(VOLUME_IMAGE_FILE);
        let user_table_path = wrapper_path.join(USER_TABLE_FILE);

        backend.create_volume(&volume_image_path, &master_secret, options)?;

        let mut user_table = UserTable::new();
        user_table.set_password(user, password, &master_secret)?;
        user_table.save(&user_table_path)?;

        let metadata = WrapperMetadata::new(VOLUME_IMAGE_FILE, USER_TABLE_FILE);
        metadata
            .save(&wrapper_path.join(METADATA_FILE))
            .map_err(|err| {
                VaultError::creation(format!("cannot write wrapper metadata: {err}"), None)
            })?;

        info!("created encrypted volume wrapper at {}", wrapper_path.display());
        Ok(Self {
            wrapper_path,
            volume_image_path,
            user_table_path,
            user_table,
            mount_point: None,
            backend,
        })
    }

    /// Opens an existing wrapper directory using the default
    /// [`HdiutilBackend`].
    ///
    /// See [`open_with_backend`](Self::open_with_backend).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_backend(path, Box::new(HdiutilBackend))
    }

    /// Opens an existing wrapper directory.
    ///
    /// Loads and validates the metadata document and the user table. No
    /// credentials are required at this point; authentication happens on the
    /// first [`attach`](Self::attach). The wrapper starts unattached.
    pub fn open_with_backend(path: impl Into<PathBuf>, backend: Box<dyn VolumeBackend>) -> Result<Self> {
        let wrapper_path = path.into();
        let metadata = WrapperMetadata::load(&wrapper_path.join(METADATA_FILE))?;
        let volume_image_path = wrapper_path.join(metadata.volume_image());
        let user_table_path = wrapper_path.join(metadata.user_table());
        let user_table = UserTable::load(&user_table_path)?;

        debug!(
            "opened wrapper at {} with {} users",
            wrapper_path.display(),
            user_table.len()
        );
        Ok(Self {
            wrapper_path,
            volume_image_path,
            user_table_path,
            user_table,
            mount_point: None,
            backend,
        })
    }

    /// Attaches the volume at `mount_point` after authenticating `user`.
    ///
    /// Authentication failures propagate before the backend is touched; a
    /// backend failure leaves the wrapper unattached.
    ///
    /// # Errors
    ///
    /// [`VaultError::Attachment`] when already attached or when the backend
    /// fails; [`VaultError::Authentication`] on bad credentials.
    pub fn attach(
        &mut self,
        user: &str,
        password: &str,
        mount_point: impl Into<PathBuf>,
    ) -> Result<&Path> {
        if self.mount_point.is_some() {
            return Err(VaultError::attachment("already attached", None));
        }

        let mount_point = mount_point.into();
        let master_secret = self.user_table.recover_master_secret(user, password)?;
        self.backend
            .attach_volume(&self.volume_image_path, &master_secret, &mount_point)?;

        info!(
            "attached {} at {}",
            self.volume_image_path.display(),
            mount_point.display()
        );
        Ok(self.mount_point.insert(mount_point))
    }

    /// Attaches the volume at a freshly created random subdirectory of
    /// `mount_root`, returning the new mount point.
    ///
    /// The subdirectory is created securely with a random name before the
    /// backend is invoked; if attachment then fails, the empty directory is
    /// removed again on a best-effort basis.
    pub fn attach_at_random_subdirectory(
        &mut self,
        user: &str,
        password: &str,
        mount_root: &Path,
    ) -> Result<PathBuf> {
        if self.mount_point.is_some() {
            return Err(VaultError::attachment("already attached", None));
        }

        let mount_point = tempfile::Builder::new()
            .prefix("vol-")
            .tempdir_in(mount_root)
            .map_err(|err| {
                VaultError::attachment(
                    format!(
                        "cannot create mount directory under {}: {err}",
                        mount_root.display()
                    ),
                    None,
                )
            })?
            .keep();

        match self.attach(user, password, &mount_point) {
            Ok(_) => Ok(mount_point),
            Err(err) => {
                let _ = fs::remove_dir(&mount_point);
                Err(err)
            }
        }
    }

    /// Detaches the currently attached volume.
    ///
    /// On backend failure the wrapper remains attached; detachment is not
    /// assumed to have partially succeeded.
    ///
    /// # Errors
    ///
    /// [`VaultError::Detachment`] when not attached or when the backend
    /// fails.
    pub fn detach(&mut self) -> Result<()> {
        let mount_point = match &self.mount_point {
            Some(mount_point) => mount_point,
            None => return Err(VaultError::detachment("not attached", None)),
        };

        self.backend.detach_volume(mount_point)?;

        info!("detached volume from {}", mount_point.display());
        self.mount_point = None;
        Ok(())
    }

    /// Returns whether the volume is currently attached.
    pub fn is_attached(&self) -> bool {
        self.mount_point.is_some()
    }

    /// The current mount point, when attached.
    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    /// The wrapper directory.
    pub fn wrapper_path(&self) -> &Path {
        &self.wrapper_path
    }

    /// The backend volume image inside the wrapper directory.
    pub fn volume_image_path(&self) -> &Path {
        &self.volume_image_path
    }

    /// The user table file inside the wrapper directory.
    pub fn user_table_path(&self) -> &Path {
        &self.user_table_path
    }

    /// The in-memory user table.
    pub fn user_table(&self) -> &UserTable {
        &self.user_table
    }

    /// Recovers the master secret from a username and password, for flows
    /// that need it beyond a single attach (such as authorizing a new
    /// user).
    ///
    /// The caller is responsible for dropping the returned secret as soon
    /// as it has served its purpose.
    pub fn recover_master_secret(&self, user: &str, password: &str) -> Result<MasterSecret> {
        self.user_table.recover_master_secret(user, password)
    }

    /// Inserts or replaces `user`'s credential envelope in the in-memory
    /// table.
    ///
    /// Changes are not persisted until [`save_user_table`](Self::save_user_table).
    pub fn set_password(
        &mut self,
        user: &str,
        password: &str,
        master_secret: &MasterSecret,
    ) -> Result<()> {
        self.user_table.set_password(user, password, master_secret)
    }

    /// Removes `user` from the in-memory table; a no-op if absent.
    ///
    /// Changes are not persisted until [`save_user_table`](Self::save_user_table).
    pub fn remove_user(&mut self, user: &str) {
        self.user_table.remove_user(user);
    }

    /// Persists the in-memory user table atomically to its file.
    pub fn save_user_table(&self) -> Result<()> {
        self.user_table.save(&self.user_table_path)
    }
}

impl fmt::Debug for EncryptedVolumeWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedVolumeWrapper")
            .field("wrapper_path", &self.wrapper_path)
            .field("mount_point", &self.mount_point)
            .field("users", &self.user_table.len())
            .finish_non_exhaustive()
    }
}
