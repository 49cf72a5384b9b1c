//! Partition Mount Manager.
//!
//! Mounts the boot partition and then the root partition at the fixed
//! [`MountLayout`] paths, and unmounts them root-first. [`MountedImage`]
//! ties attach and mount together into one scoped resource: however the
//! scope is left, the partitions are unmounted and the image detached.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cleanup::best_effort;
use crate::config::MountLayout;
use crate::error::{ImageError, MountError};
use crate::image::attach::{AttachedPartitionSet, Attachment, DeviceAttacher};
use crate::image::chroot::ChrootGuard;
use crate::process::{Cmd, Host};

fn check_mounted(host: &dyn Host, path: &Path) -> anyhow::Result<bool> {
    Cmd::new("mountpoint")
        .arg("-q")
        .arg_path(path)
        .allow_fail()
        .run_on(host)
        .map(|r| r.success())
}

/// Whether `path` is currently a mount point on `host`. A check that
/// cannot run counts as not mounted, with a warning.
pub fn is_mounted(host: &dyn Host, path: &Path) -> bool {
    check_mounted(host, path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), "cannot tell whether mounted: {e:#}");
        false
    })
}

/// Unmount `target`. Not being mounted is not an error.
///
/// If `mountpoint` cannot run, the unmount is attempted anyway so a failure
/// surfaces here instead of at detach time.
pub fn unmount_path(host: &dyn Host, target: &Path) -> Result<(), MountError> {
    match check_mounted(host, target) {
        Ok(false) => {
            tracing::debug!(target = %target.display(), "not mounted, nothing to do");
            return Ok(());
        }
        Ok(true) => {}
        Err(e) => tracing::warn!(
            target = %target.display(),
            "mount state unknown, unmounting anyway: {e:#}"
        ),
    }
    Cmd::new("umount")
        .arg_path(target)
        .run_on(host)
        .map_err(|e| MountError::Unmount {
            target: target.to_path_buf(),
            detail: format!("{e:#}"),
        })?;
    tracing::info!(target = %target.display(), "unmounted");
    Ok(())
}

/// The boot and root mount points an attached image is mounted on.
#[derive(Debug)]
pub struct MountSet {
    boot: PathBuf,
    root: PathBuf,
    readonly: bool,
}

impl MountSet {
    /// Mount boot, then root. If root fails, boot is unmounted again before
    /// the error is returned.
    pub fn mount(
        host: &dyn Host,
        partitions: &AttachedPartitionSet,
        layout: &MountLayout,
        readonly: bool,
    ) -> Result<Self, MountError> {
        for target in [&layout.boot, &layout.root] {
            if is_mounted(host, target) {
                return Err(MountError::Busy {
                    target: target.clone(),
                });
            }
            fs::create_dir_all(target).map_err(|source| MountError::CreateMountPoint {
                target: target.clone(),
                source,
            })?;
        }

        mount_device(host, partitions.boot(), &layout.boot, readonly)?;
        if let Err(e) = mount_device(host, partitions.root(), &layout.root, readonly) {
            best_effort("unmount boot partition", || unmount_path(host, &layout.boot));
            return Err(e);
        }

        Ok(Self {
            boot: layout.boot.clone(),
            root: layout.root.clone(),
            readonly,
        })
    }

    pub fn boot(&self) -> &Path {
        &self.boot
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Unmount root, then boot. Safe to call repeatedly.
    ///
    /// Boot is still attempted if root fails; the first error is returned.
    pub fn unmount(&self, host: &dyn Host) -> Result<(), MountError> {
        let root = unmount_path(host, &self.root);
        let boot = unmount_path(host, &self.boot);
        root.and(boot)
    }
}

fn mount_device(
    host: &dyn Host,
    device: &Path,
    target: &Path,
    readonly: bool,
) -> Result<(), MountError> {
    let mut cmd = Cmd::new("mount");
    if readonly {
        cmd = cmd.arg("-r");
    }
    cmd.arg_path(device)
        .arg_path(target)
        .run_on(host)
        .map_err(|e| MountError::Mount {
            device: device.to_path_buf(),
            target: target.to_path_buf(),
            detail: format!("{e:#}"),
        })?;
    tracing::info!(
        device = %device.display(),
        target = %target.display(),
        readonly,
        "mounted"
    );
    Ok(())
}

/// An attached and mounted image.
///
/// Dropping it unmounts both partitions and detaches the image. The
/// mapping is only removed once nothing is mounted from it any more.
pub struct MountedImage<'h> {
    host: &'h dyn Host,
    attachment: Attachment<'h>,
    mounts: Option<MountSet>,
}

impl<'h> MountedImage<'h> {
    /// Attach `image` and mount its partitions on `layout`.
    pub fn open(
        host: &'h dyn Host,
        image: &Path,
        layout: &MountLayout,
        readonly: bool,
    ) -> Result<Self, ImageError> {
        // Refuse before touching device-mapper if another build holds the
        // mount points.
        for target in [&layout.boot, &layout.root] {
            if is_mounted(host, target) {
                return Err(MountError::Busy {
                    target: target.clone(),
                }
                .into());
            }
        }

        let attachment = DeviceAttacher::new(host).attach_scoped(image)?;
        // On failure `attachment` drops here and detaches.
        let mounts = MountSet::mount(host, attachment.partitions(), layout, readonly)?;

        Ok(Self {
            host,
            attachment,
            mounts: Some(mounts),
        })
    }

    pub fn image(&self) -> &Path {
        self.attachment.image()
    }

    pub fn partitions(&self) -> &AttachedPartitionSet {
        self.attachment.partitions()
    }

    pub fn host(&self) -> &'h dyn Host {
        self.host
    }

    /// Mounted boot partition.
    pub fn boot(&self) -> &Path {
        self.mounts
            .as_ref()
            .map(MountSet::boot)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Mounted root filesystem.
    pub fn root(&self) -> &Path {
        self.mounts
            .as_ref()
            .map(MountSet::root)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Bind the host's kernel interfaces into the root filesystem.
    pub fn chroot(&self) -> Result<ChrootGuard<'_>, ImageError> {
        Ok(ChrootGuard::bind(self.host, self.root())?)
    }

    /// Unmount and detach now, reporting unmount failures.
    ///
    /// If unmounting fails the image stays attached.
    pub fn release(mut self) -> Result<(), MountError> {
        self.release_inner()
    }

    /// Leave the image mounted and attached after this value is gone.
    pub fn persist(mut self) -> MountLayout {
        self.attachment.disarm();
        let layout = MountLayout {
            boot: self.boot().to_path_buf(),
            root: self.root().to_path_buf(),
        };
        self.mounts = None;
        layout
    }

    fn release_inner(&mut self) -> Result<(), MountError> {
        if let Some(mounts) = self.mounts.take() {
            if let Err(e) = mounts.unmount(self.host) {
                tracing::error!(
                    image = %self.attachment.image().display(),
                    "leaving image attached: {e}"
                );
                self.attachment.disarm();
                return Err(e);
            }
        }
        self.attachment.detach();
        Ok(())
    }
}

impl Drop for MountedImage<'_> {
    fn drop(&mut self) {
        best_effort("release mounted image", || self.release_inner());
    }
}

/// Tear down whatever a previous `mount` left behind for `image`.
///
/// Every part is optional: unmounted paths and missing mappings are skipped.
pub fn release_by_path(host: &dyn Host, image: &Path, layout: &MountLayout) -> Result<(), MountError> {
    let mounts = MountSet {
        boot: layout.boot.clone(),
        root: layout.root.clone(),
        readonly: false,
    };
    mounts.unmount(host)?;
    DeviceAttacher::new(host).detach(image);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttachError;
    use crate::testing::FakeHost;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        image: PathBuf,
        layout: MountLayout,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("base.img");
        fs::write(&image, b"").unwrap();
        let layout = MountLayout {
            boot: dir.path().join("part1"),
            root: dir.path().join("part2"),
        };
        Fixture {
            _dir: dir,
            image,
            layout,
        }
    }

    #[test]
    fn test_boot_mounted_before_root_and_unmounted_after() {
        let fx = fixture();
        let host = FakeHost::new();
        {
            let mounted = MountedImage::open(&host, &fx.image, &fx.layout, false).unwrap();
            assert_eq!(mounted.root(), fx.layout.root);
            assert_eq!(host.mounted(), vec![fx.layout.boot.clone(), fx.layout.root.clone()]);
        }

        let boot = fx.layout.boot.display().to_string();
        let root = fx.layout.root.display().to_string();
        let cmds = host.commands();
        let pos = |needle: &str| cmds.iter().position(|c| c == needle).unwrap();

        assert!(pos(&format!("mount /dev/mapper/loop0p1 {boot}")) < pos(&format!("mount /dev/mapper/loop0p2 {root}")));
        assert!(pos(&format!("umount {root}")) < pos(&format!("umount {boot}")));
        assert!(host.mounted().is_empty());
        assert!(!host.is_mapped());
    }

    #[test]
    fn test_mount_points_created() {
        let fx = fixture();
        let host = FakeHost::new();
        let _mounted = MountedImage::open(&host, &fx.image, &fx.layout, false).unwrap();
        assert!(fx.layout.boot.is_dir());
        assert!(fx.layout.root.is_dir());
    }

    #[test]
    fn test_readonly_uses_r_flag() {
        let fx = fixture();
        let host = FakeHost::new();
        let mounted = MountedImage::open(&host, &fx.image, &fx.layout, true).unwrap();
        mounted.release().unwrap();
        assert_eq!(host.count("mount -r /dev/mapper"), 2);
    }

    #[test]
    fn test_root_mount_failure_unwinds_boot_and_detaches() {
        let fx = fixture();
        let host = FakeHost::new().fail_on("mount /dev/mapper/loop0p2");
        let err = MountedImage::open(&host, &fx.image, &fx.layout, false)
            .err()
            .unwrap();

        assert!(matches!(err, ImageError::Mount(MountError::Mount { .. })));
        assert!(host.mounted().is_empty());
        assert!(!host.is_mapped());
    }

    #[test]
    fn test_attach_failure_never_mounts() {
        let fx = fixture();
        let host = FakeHost::with_partitions(&["loop0p1"]);
        let err = MountedImage::open(&host, &fx.image, &fx.layout, false)
            .err()
            .unwrap();

        assert!(matches!(err, ImageError::Attach(AttachError::TooFewPartitions { .. })));
        assert_eq!(host.count("mount /dev"), 0);
    }

    #[test]
    fn test_busy_mount_point_refused() {
        let fx = fixture();
        let host = FakeHost::new().premount(&fx.layout.root);
        let err = MountedImage::open(&host, &fx.image, &fx.layout, false)
            .err()
            .unwrap();

        assert!(matches!(err, ImageError::Mount(MountError::Busy { .. })));
        assert_eq!(host.count("kpartx"), 0);
    }

    /// FakeHost without a `mountpoint` binary.
    struct NoMountpoint(FakeHost);

    impl Host for NoMountpoint {
        fn execute(&self, cmd: &Cmd) -> std::io::Result<crate::process::CommandResult> {
            if cmd.program() == "mountpoint" {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no mountpoint"));
            }
            self.0.execute(cmd)
        }
    }

    #[test]
    fn test_unknown_mount_state_still_unmounts() {
        let f = fixture();
        let host = NoMountpoint(FakeHost::new().premount(&f.layout.root));

        assert!(!is_mounted(&host, &f.layout.root));
        unmount_path(&host, &f.layout.root).unwrap();
        assert!(host.0.mounted().is_empty());
        assert_eq!(host.0.count("umount"), 1);
    }

    #[test]
    fn test_unknown_mount_state_surfaces_unmount_failure() {
        let f = fixture();
        let host = NoMountpoint(FakeHost::new());

        let err = unmount_path(&host, &f.layout.boot).unwrap_err();
        assert!(matches!(err, MountError::Unmount { .. }));
    }

    #[test]
    fn test_unmount_twice_is_noop() {
        let fx = fixture();
        let host = FakeHost::new();
        let attacher = DeviceAttacher::new(&host);
        let partitions = attacher.attach(&fx.image).unwrap();
        let mounts = MountSet::mount(&host, &partitions, &fx.layout, false).unwrap();

        mounts.unmount(&host).unwrap();
        let umounts = host.count("umount");
        mounts.unmount(&host).unwrap();

        assert_eq!(host.count("umount"), umounts);
        attacher.detach(&fx.image);
    }

    #[test]
    fn test_failed_unmount_keeps_image_attached() {
        let fx = fixture();
        let host = FakeHost::new().fail_on(&format!("umount {}", fx.layout.root.display()));
        let mounted = MountedImage::open(&host, &fx.image, &fx.layout, false).unwrap();

        assert!(mounted.release().is_err());
        assert!(host.is_mapped());
        assert_eq!(host.count("kpartx -d"), 0);
    }

    #[test]
    fn test_persist_then_release_by_path() {
        let fx = fixture();
        let host = FakeHost::new();
        let layout = MountedImage::open(&host, &fx.image, &fx.layout, false)
            .unwrap()
            .persist();
        assert_eq!(layout, fx.layout);
        assert_eq!(host.mounted().len(), 2);
        assert!(host.is_mapped());

        release_by_path(&host, &fx.image, &fx.layout).unwrap();
        assert!(host.mounted().is_empty());
        assert!(!host.is_mapped());

        // Nothing left: still fine
        release_by_path(&host, &fx.image, &fx.layout).unwrap();
    }
}
