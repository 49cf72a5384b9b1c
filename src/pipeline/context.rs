//! Context handed to every customization step.

use std::path::{Path, PathBuf};

use crate::config::{Config, MountLayout};
use crate::error::BindMountError;
use crate::image::{ChrootGuard, MountedImage};
use crate::process::Host;

/// Where the image is mounted and how to reach the host.
///
/// Borrows the mounted image (or, in tests, a layout) for the whole
/// pipeline, so a step can never outlive the mounts it works on.
pub struct StepContext<'a> {
    host: &'a dyn Host,
    config: &'a Config,
    boot: &'a Path,
    root: &'a Path,
}

impl<'a> StepContext<'a> {
    /// Steps against a mounted image.
    pub fn for_image(image: &'a MountedImage<'_>, config: &'a Config) -> Self {
        Self {
            host: image.host(),
            config,
            boot: image.boot(),
            root: image.root(),
        }
    }

    /// Steps against an already populated directory pair.
    pub fn new(host: &'a dyn Host, config: &'a Config, layout: &'a MountLayout) -> Self {
        Self {
            host,
            config,
            boot: &layout.boot,
            root: &layout.root,
        }
    }

    pub fn host(&self) -> &'a dyn Host {
        self.host
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Mounted boot partition.
    pub fn boot(&self) -> &'a Path {
        self.boot
    }

    /// Mounted root filesystem.
    pub fn root(&self) -> &'a Path {
        self.root
    }

    /// Host path of `path` inside the image (`/etc/hostname` ->
    /// `<root>/etc/hostname`).
    pub fn rootfs(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Bind kernel interfaces for commands that must run inside the image.
    pub fn chroot(&self) -> Result<ChrootGuard<'a>, BindMountError> {
        ChrootGuard::bind(self.host, self.root)
    }
}
