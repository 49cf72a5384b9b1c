//! Enabling systemd units by symlink, without running systemctl.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

/// Unit whose `.wants` directory a service is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// multi-user.target.wants
    MultiUser,
    /// NetworkManager.service.wants
    NetworkManager,
}

impl Target {
    /// The wants directory path for this target, relative to the rootfs.
    pub fn wants_dir(&self) -> &'static str {
        match self {
            Target::MultiUser => "etc/systemd/system/multi-user.target.wants",
            Target::NetworkManager => "etc/systemd/system/NetworkManager.service.wants",
        }
    }
}

/// Write a unit file to `/etc/systemd/system` in the image.
pub fn write_unit(rootfs: &Path, unit: &str, content: &str) -> Result<PathBuf> {
    let dir = rootfs.join("etc/systemd/system");
    fs::create_dir_all(&dir)?;
    let path = dir.join(unit);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Link `unit_path` (absolute inside the image) into `target`'s wants
/// directory, replacing any existing link.
pub fn enable(rootfs: &Path, unit: &str, unit_path: &str, target: Target) -> Result<()> {
    let wants_dir = rootfs.join(target.wants_dir());
    fs::create_dir_all(&wants_dir)?;
    let link = wants_dir.join(unit);

    if link.exists() || link.is_symlink() {
        fs::remove_file(&link)?;
    }
    symlink(unit_path, &link)
        .with_context(|| format!("Failed to enable {} ({})", unit, link.display()))?;
    tracing::debug!(unit, wants = target.wants_dir(), "enabled");
    Ok(())
}

/// Whether `unit` is linked into `target`'s wants directory.
pub fn is_enabled(rootfs: &Path, unit: &str, target: Target) -> bool {
    rootfs.join(target.wants_dir()).join(unit).is_symlink()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enable_creates_wants_symlink() {
        let root = TempDir::new().unwrap();
        enable(root.path(), "ssh.service", "/lib/systemd/system/ssh.service", Target::MultiUser)
            .unwrap();

        let link = root
            .path()
            .join("etc/systemd/system/multi-user.target.wants/ssh.service");
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("/lib/systemd/system/ssh.service")
        );
        assert!(is_enabled(root.path(), "ssh.service", Target::MultiUser));
    }

    #[test]
    fn test_enable_replaces_existing_link() {
        let root = TempDir::new().unwrap();
        enable(root.path(), "a.service", "/old/a.service", Target::NetworkManager).unwrap();
        enable(root.path(), "a.service", "/etc/systemd/system/a.service", Target::NetworkManager)
            .unwrap();

        let link = root.path().join(Target::NetworkManager.wants_dir()).join("a.service");
        assert_eq!(
            fs::read_link(link).unwrap(),
            PathBuf::from("/etc/systemd/system/a.service")
        );
    }

    #[test]
    fn test_write_unit() {
        let root = TempDir::new().unwrap();
        let path = write_unit(root.path(), "x.service", "[Unit]\n").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "[Unit]\n");
        assert!(!is_enabled(root.path(), "x.service", Target::MultiUser));
    }
}
