//! External volume backend interface.
//!
//! The core never touches the encrypted volume image's internals. Creation,
//! attachment, and detachment are delegated to a [`VolumeBackend`], which
//! keeps the lifecycle logic platform-independent and unit-testable with a
//! scripted backend. [`HdiutilBackend`] is the production implementation,
//! shelling out to the macOS `hdiutil` tool.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};

use log::debug;

use crate::crypto::MasterSecret;
use crate::error::{Result, VaultError};

/// Name of the disk image tool driven by [`HdiutilBackend`].
const HDIUTIL: &str = "hdiutil";

/// Encryption type requested from the backend when none is specified.
const DEFAULT_ENCRYPTION_TYPE: &str = "AES-256";

/// Options passed through verbatim to the backend's create operation.
///
/// Only `size` is required; unset options are omitted from the backend
/// invocation so its own defaults apply.
#[derive(Debug, Clone, Default)]
pub struct VolumeOptions {
    /// Volume size, in the backend's notation (e.g. `"10m"`, `"1g"`).
    pub size: String,
    /// Name of the volume's filesystem.
    pub volume_name: Option<String>,
    /// Encryption type identifier understood by the backend.
    pub encryption_type: Option<String>,
    /// Owning user id of the volume root.
    pub uid: Option<u32>,
    /// Owning group id of the volume root.
    pub gid: Option<u32>,
    /// Access mode of the volume root, in the backend's notation.
    pub mode: Option<String>,
}

impl VolumeOptions {
    /// Creates options for a volume of the given size.
    pub fn new(size: impl Into<String>) -> Self {
        Self {
            size: size.into(),
            ..Self::default()
        }
    }

    /// Sets the volume's filesystem name.
    pub fn with_volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self
    }

    /// Sets the encryption type identifier.
    pub fn with_encryption_type(mut self, encryption_type: impl Into<String>) -> Self {
        self.encryption_type = Some(encryption_type.into());
        self
    }

    /// Sets the owning uid and gid of the volume root.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    /// Sets the access mode of the volume root.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

/// The external subsystem that physically creates, attaches, and detaches
/// the encrypted volume.
///
/// All three operations block until the backend finishes. Failures carry the
/// backend's diagnostic output in the corresponding error kind.
pub trait VolumeBackend {
    /// Materializes a new encrypted volume image at `image_path`, unlockable
    /// with `secret`.
    fn create_volume(
        &self,
        image_path: &Path,
        secret: &MasterSecret,
        options: &VolumeOptions,
    ) -> Result<()>;

    /// Attaches the volume image at `image_path` to `mount_point`.
    fn attach_volume(
        &self,
        image_path: &Path,
        secret: &MasterSecret,
        mount_point: &Path,
    ) -> Result<()>;

    /// Detaches the volume currently attached at `mount_point`.
    fn detach_volume(&self, mount_point: &Path) -> Result<()>;
}

/// Volume backend driving the macOS `hdiutil` disk image tool.
///
/// The master secret always travels over the child's stdin (`-stdinpass`),
/// never on the command line. Captured stderr becomes the diagnostic text of
/// the surfaced error.
#[derive(Debug, Clone, Copy, Default)]
pub struct HdiutilBackend;

impl HdiutilBackend {
    fn run(args: Vec<OsString>, passphrase: Option<&MasterSecret>) -> io::Result<Output> {
        let mut command = Command::new(HDIUTIL);
        command
            .args(args)
            .stdin(if passphrase.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        if let Some(secret) = passphrase {
            // hdiutil reads the passphrase up to EOF; no trailing newline.
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(secret.expose().as_bytes())?;
            }
        }
        child.wait_with_output()
    }
}

impl VolumeBackend for HdiutilBackend {
    fn create_volume(
        &self,
        image_path: &Path,
        secret: &MasterSecret,
        options: &VolumeOptions,
    ) -> Result<()> {
        if options.size.is_empty() {
            return Err(VaultError::InvalidParameter(
                "volume size must not be empty".into(),
            ));
        }

        let output = Self::run(create_args(image_path, options), Some(secret)).map_err(|err| {
            VaultError::creation(format!("failed to run {HDIUTIL} create: {err}"), None)
        })?;
        if !output.status.success() {
            return Err(VaultError::creation(
                format!("{HDIUTIL} create exited with {}", output.status),
                diagnostic_text(&output.stderr),
            ));
        }

        debug!("created encrypted volume image at {}", image_path.display());
        Ok(())
    }

    fn attach_volume(
        &self,
        image_path: &Path,
        secret: &MasterSecret,
        mount_point: &Path,
    ) -> Result<()> {
        let output =
            Self::run(attach_args(image_path, mount_point), Some(secret)).map_err(|err| {
                VaultError::attachment(format!("failed to run {HDIUTIL} attach: {err}"), None)
            })?;
        if !output.status.success() {
            return Err(VaultError::attachment(
                format!("{HDIUTIL} attach exited with {}", output.status),
                diagnostic_text(&output.stderr),
            ));
        }

        debug!(
            "attached {} at {}",
            image_path.display(),
            mount_point.display()
        );
        Ok(())
    }

    fn detach_volume(&self, mount_point: &Path) -> Result<()> {
        let output = Self::run(detach_args(mount_point), None).map_err(|err| {
            VaultError::detachment(format!("failed to run {HDIUTIL} detach: {err}"), None)
        })?;
        if !output.status.success() {
            return Err(VaultError::detachment(
                format!("{HDIUTIL} detach exited with {}", output.status),
                diagnostic_text(&output.stderr),
            ));
        }

        debug!("detached volume at {}", mount_point.display());
        Ok(())
    }
}

fn create_args(image_path: &Path, options: &VolumeOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "create".into(),
        "-size".into(),
        options.size.clone().into(),
        "-fs".into(),
        "HFS+".into(),
        "-encryption".into(),
        options
            .encryption_type
            .clone()
            .unwrap_or_else(|| DEFAULT_ENCRYPTION_TYPE.into())
            .into(),
        "-stdinpass".into(),
    ];
    if let Some(name) = &options.volume_name {
        args.push("-volname".into());
        args.push(name.clone().into());
    }
    if let Some(uid) = options.uid {
        args.push("-uid".into());
        args.push(uid.to_string().into());
    }
    if let Some(gid) = options.gid {
        args.push("-gid".into());
        args.push(gid.to_string().into());
    }
    if let Some(mode) = &options.mode {
        args.push("-mode".into());
        args.push(mode.clone().into());
    }
    args.push(image_path.into());
    args
}

fn attach_args(image_path: &Path, mount_point: &Path) -> Vec<OsString> {
    vec![
        "attach".into(),
        image_path.into(),
        "-mountpoint".into(),
        mount_point.into(),
        "-stdinpass".into(),
    ]
}

fn detach_args(mount_point: &Path) -> Vec<OsString> {
    vec!["detach".into(), mount_point.into()]
}

/// Turns captured stderr into diagnostic text, or `None` when empty.
fn diagnostic_text(stderr: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stderr).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
