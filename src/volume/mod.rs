//! Encrypted volume wrapper management.
//!
//! This module provides multi-user access to one shared encrypted volume:
//! a persisted user table of credential envelopes, the attach/detach
//! lifecycle around it, and the external backend interface that physically
//! creates and mounts the volume.

pub mod backend;
pub mod metadata;
pub mod user_table;
pub mod wrapper;

pub use backend::{HdiutilBackend, VolumeBackend, VolumeOptions};
pub use metadata::WrapperMetadata;
pub use user_table::UserTable;
pub use wrapper::EncryptedVolumeWrapper;
