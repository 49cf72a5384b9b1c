//! Files replaced inside the image for the duration of one step.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::cleanup::best_effort;

/// Invokers in the image consult this before starting services; exit 101
/// means "do not start", so package installs don't launch daemons in the
/// change-root.
pub const POLICY_RC_D: &str = "#!/bin/sh\nexit 101\n";

const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

/// A file written over whatever was at `path`. The previous file (or its
/// absence) is restored on drop.
#[derive(Debug)]
pub struct FileOverlay {
    path: PathBuf,
    backup: Option<PathBuf>,
}

impl FileOverlay {
    pub fn install(path: &Path, contents: &[u8], mode: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let backup = if path.exists() || path.is_symlink() {
            let mut name: OsString = path.as_os_str().to_owned();
            name.push(".lemon-bak");
            let backup = PathBuf::from(name);
            fs::rename(path, &backup)
                .with_context(|| format!("Failed to back up {}", path.display()))?;
            Some(backup)
        } else {
            None
        };
        let overlay = Self {
            path: path.to_path_buf(),
            backup,
        };

        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(overlay)
    }

    /// Put the image's resolver config aside and use the host's, so the
    /// change-root can resolve package mirrors. `None` if the host has none.
    pub fn host_dns(rootfs: &Path) -> Result<Option<Self>> {
        Self::dns_from(Path::new(HOST_RESOLV_CONF), rootfs)
    }

    pub(crate) fn dns_from(host_resolv: &Path, rootfs: &Path) -> Result<Option<Self>> {
        let Ok(contents) = fs::read(host_resolv) else {
            tracing::warn!(
                "{} not readable, the image keeps its own resolver config",
                host_resolv.display()
            );
            return Ok(None);
        };
        Self::install(&rootfs.join("etc/resolv.conf"), &contents, 0o644).map(Some)
    }

    fn restore(&mut self) -> Result<()> {
        if self.path.exists() || self.path.is_symlink() {
            fs::remove_file(&self.path)?;
        }
        if let Some(backup) = self.backup.take() {
            fs::rename(&backup, &self.path)?;
        }
        Ok(())
    }
}

impl Drop for FileOverlay {
    fn drop(&mut self) {
        let what = format!("restore {}", self.path.display());
        best_effort(&what, || self.restore());
    }
}
