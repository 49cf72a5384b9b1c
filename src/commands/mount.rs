//! Mount and unmount commands - manual inspection of an image.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::image::{release_by_path, MountedImage};
use crate::process::Host;

/// Attach and mount `image`, leaving it mounted after exit.
pub fn cmd_mount(host: &dyn Host, image: &Path, config: &Config, readonly: bool) -> Result<()> {
    let mounted = MountedImage::open(host, image, config.mount_layout(), readonly)
        .with_context(|| format!("Failed to mount {}", image.display()))?;
    let layout = mounted.persist();

    println!("Mounted {}{}", image.display(), if readonly { " (read-only)" } else { "" });
    println!("  boot:   {}", layout.boot.display());
    println!("  rootfs: {}", layout.root.display());
    println!("\nRelease with: lemon-pi unmount {}", image.display());
    Ok(())
}

/// Unmount whatever is mounted on the configured mount points and detach
/// `image`. Safe to run when nothing is mounted.
pub fn cmd_unmount(host: &dyn Host, image: &Path, config: &Config) -> Result<()> {
    release_by_path(host, image, config.mount_layout())
        .with_context(|| format!("Failed to release {}", image.display()))?;
    println!("Released {}", image.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config::from_vars(&HashMap::from([
            ("BOOT_MOUNT".to_string(), dir.path().join("boot").display().to_string()),
            ("ROOTFS_MOUNT".to_string(), dir.path().join("root").display().to_string()),
        ]))
        .unwrap()
    }

    #[test]
    fn test_mount_persists_until_unmount() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("pi.img");
        std::fs::write(&image, b"img").unwrap();
        let config = config(&dir);
        let host = FakeHost::new();

        cmd_mount(&host, &image, &config, true).unwrap();
        assert_eq!(host.mounted().len(), 2);
        assert!(host.is_mapped());

        cmd_unmount(&host, &image, &config).unwrap();
        assert!(host.mounted().is_empty());
        assert!(!host.is_mapped());

        // Second release is a no-op.
        cmd_unmount(&host, &image, &config).unwrap();
    }
}
