//! Device Attacher: exposes an image's partitions as device-mapper nodes.
//!
//! `kpartx -av` maps every partition of the image and reports one
//! `add map <name> ...` line per partition, in partition-table order. The
//! first reported device is the boot partition, the second the root
//! filesystem.

use std::path::{Path, PathBuf};

use crate::cleanup::best_effort;
use crate::error::AttachError;
use crate::process::{Cmd, Host};

/// Partitions a dual-partition Raspberry Pi image must expose.
pub const EXPECTED_PARTITIONS: usize = 2;

const BOOT_FS_TYPES: &[&str] = &["vfat", "msdos", "fat"];
const ROOT_FS_TYPES: &[&str] = &["ext2", "ext3", "ext4"];

/// Device nodes created by attaching one image.
///
/// Only valid while the image stays attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedPartitionSet {
    devices: Vec<PathBuf>,
}

impl AttachedPartitionSet {
    pub fn devices(&self) -> &[PathBuf] {
        &self.devices
    }

    /// The boot (FAT) partition.
    pub fn boot(&self) -> &Path {
        &self.devices[0]
    }

    /// The root filesystem partition.
    pub fn root(&self) -> &Path {
        &self.devices[1]
    }
}

/// Extract device-mapper names from kpartx output, in reported order.
pub fn parse_kpartx_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("add map ")?;
            rest.split_whitespace().next().map(String::from)
        })
        .collect()
}

/// Attaches and detaches images through kpartx.
pub struct DeviceAttacher<'h> {
    host: &'h dyn Host,
}

impl<'h> DeviceAttacher<'h> {
    pub fn new(host: &'h dyn Host) -> Self {
        Self { host }
    }

    /// Map the image's partitions and return them boot-first.
    ///
    /// Fails if fewer than [`EXPECTED_PARTITIONS`] come back, after
    /// removing whatever was mapped.
    pub fn attach(&self, image: &Path) -> Result<AttachedPartitionSet, AttachError> {
        if !image.exists() {
            return Err(AttachError::ImageNotFound(image.to_path_buf()));
        }

        // kpartx can map some partitions before failing on a later one.
        let result = Cmd::new("kpartx")
            .arg("-av")
            .arg_path(image)
            .run_on(self.host)
            .map_err(|e| {
                self.detach(image);
                AttachError::Tool {
                    image: image.to_path_buf(),
                    detail: format!("{e:#}"),
                }
            })?;

        let devices: Vec<PathBuf> = parse_kpartx_output(&result.stdout)
            .into_iter()
            .map(|name| Path::new("/dev/mapper").join(name))
            .collect();

        if devices.len() < EXPECTED_PARTITIONS {
            self.detach(image);
            return Err(AttachError::TooFewPartitions {
                image: image.to_path_buf(),
                expected: EXPECTED_PARTITIONS,
                found: devices.len(),
            });
        }

        let set = AttachedPartitionSet { devices };
        if let Err(e) = self.check_roles(&set) {
            self.detach(image);
            return Err(e);
        }

        tracing::info!(
            image = %image.display(),
            boot = %set.boot().display(),
            root = %set.root().display(),
            "attached image"
        );
        Ok(set)
    }

    /// Remove the image's mappings. Never fails: the mapping may already be
    /// gone, so a non-zero exit is only a warning.
    pub fn detach(&self, image: &Path) -> bool {
        let detached = best_effort("kpartx -d", || {
            Cmd::new("kpartx")
                .arg("-d")
                .arg_path(image)
                .run_on(self.host)
        });
        if detached {
            tracing::info!(image = %image.display(), "detached image");
        } else {
            tracing::warn!(
                image = %image.display(),
                "mappings may already have been removed"
            );
        }
        detached
    }

    /// Attach and return a guard that detaches when dropped.
    pub fn attach_scoped(&self, image: &Path) -> Result<Attachment<'h>, AttachError> {
        let partitions = self.attach(image)?;
        Ok(Attachment {
            host: self.host,
            image: image.to_path_buf(),
            partitions,
            attached: true,
        })
    }

    /// Confirm the positional roles against the filesystem types blkid
    /// reports. Unknown types fall back to position.
    fn check_roles(&self, set: &AttachedPartitionSet) -> Result<(), AttachError> {
        let roles = [
            ("boot", set.boot(), BOOT_FS_TYPES, "vfat"),
            ("root", set.root(), ROOT_FS_TYPES, "ext2/3/4"),
        ];

        for (role, device, accepted, expected) in roles {
            let Some(found) = self.detect_fs_type(device) else {
                tracing::warn!(
                    device = %device.display(),
                    "could not determine filesystem type; assuming {role} by position"
                );
                continue;
            };
            if !accepted.contains(&found.as_str()) {
                return Err(AttachError::RoleMismatch {
                    role,
                    device: device.to_path_buf(),
                    found,
                    expected,
                });
            }
        }
        Ok(())
    }

    fn detect_fs_type(&self, device: &Path) -> Option<String> {
        let result = Cmd::new("blkid")
            .args(["-o", "value", "-s", "TYPE"])
            .arg_path(device)
            .allow_fail()
            .run_on(self.host)
            .ok()?;
        let fs_type = result.stdout_trimmed();
        (result.success() && !fs_type.is_empty()).then(|| fs_type.to_string())
    }
}

/// An attached image that is detached again when dropped.
pub struct Attachment<'h> {
    host: &'h dyn Host,
    image: PathBuf,
    partitions: AttachedPartitionSet,
    attached: bool,
}

impl Attachment<'_> {
    pub fn partitions(&self) -> &AttachedPartitionSet {
        &self.partitions
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Detach now. Calling it again is a no-op.
    pub fn detach(&mut self) -> bool {
        if !self.attached {
            return true;
        }
        self.attached = false;
        DeviceAttacher::new(self.host).detach(&self.image)
    }

    /// Keep the mapping alive past this guard.
    pub(crate) fn disarm(&mut self) {
        self.attached = false;
    }
}

impl Drop for Attachment<'_> {
    fn drop(&mut self) {
        self.detach();
    }
}
