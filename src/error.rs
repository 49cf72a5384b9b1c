//! Typed errors for the image subsystem.
//!
//! Command failures are flattened into `detail` strings (the `{:#}` chain of
//! the underlying `anyhow` error) because they originate in [`crate::process`]
//! and already carry the exit code and stderr.

use std::path::PathBuf;
use thiserror::Error;

/// Attaching an image's partitions to the device-mapper layer failed.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("kpartx could not map {image}: {detail}")]
    Tool { image: PathBuf, detail: String },

    #[error("expected at least {expected} partitions in {image}, found {found}")]
    TooFewPartitions {
        image: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{role} partition {device} has filesystem '{found}', expected {expected}")]
    RoleMismatch {
        role: &'static str,
        device: PathBuf,
        found: String,
        expected: &'static str,
    },
}

/// Mounting or unmounting a partition failed.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("{target} is already mounted; is another build running on this host?")]
    Busy { target: PathBuf },

    #[error("cannot create mount point {target}: {source}")]
    CreateMountPoint {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to mount {device} at {target}: {detail}")]
    Mount {
        device: PathBuf,
        target: PathBuf,
        detail: String,
    },

    #[error("failed to unmount {target}: {detail}")]
    Unmount { target: PathBuf, detail: String },
}

/// Setting up the kernel-interface bind mounts of a change-root failed.
#[derive(Debug, Error)]
pub enum BindMountError {
    #[error("cannot create {target}: {source}")]
    CreateTarget {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {name} at {target}: {detail}")]
    Bind {
        name: &'static str,
        target: PathBuf,
        detail: String,
    },

    #[error("failed to mark {target} as rslave: {detail}")]
    MakeSlave { target: PathBuf, detail: String },
}

/// Any failure of the attach/mount/bind stack.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    BindMount(#[from] BindMountError),
}
