//! Image Expander.
//!
//! Grows the image file, stretches the last partition over the new space
//! and resizes the root filesystem to fill it. Nothing here is fatal: on
//! failure the image still boots and the OS grows the filesystem itself on
//! first boot, so the caller only gets a warning.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::image::attach::DeviceAttacher;
use crate::process::{Cmd, Host};

/// Highest e2fsck exit code that still means the filesystem is usable
/// (0 clean, 1 errors corrected, 2 corrected and reboot advised, 3 both).
const E2FSCK_MAX_OK: i32 = 3;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// `gb` GiB in bytes. Errors instead of wrapping on absurd sizes.
pub fn gib_to_bytes(gb: u64) -> Result<u64> {
    gb.checked_mul(GIB)
        .with_context(|| format!("Expansion size of {gb}GB overflows"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandResult {
    pub success: bool,
    /// Size of the image file afterwards.
    pub new_size_bytes: u64,
    /// Why expansion did not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Grow `image` by `additional_bytes` and resize its root filesystem.
pub fn expand(host: &dyn Host, image: &Path, additional_bytes: u64) -> ExpandResult {
    match try_expand(host, image, additional_bytes) {
        Ok(new_size_bytes) => {
            tracing::info!(
                image = %image.display(),
                new_size_bytes,
                "image expanded"
            );
            ExpandResult {
                success: true,
                new_size_bytes,
                warning: None,
            }
        }
        Err(e) => {
            tracing::warn!(
                image = %image.display(),
                "could not expand image, filesystem will grow on first boot: {e:#}"
            );
            ExpandResult {
                success: false,
                new_size_bytes: image.metadata().map(|m| m.len()).unwrap_or(0),
                warning: Some(format!("{e:#}")),
            }
        }
    }
}

fn try_expand(host: &dyn Host, image: &Path, additional_bytes: u64) -> Result<u64> {
    let new_size = grow_file(image, additional_bytes)?;

    let table = Cmd::new("parted")
        .args(["-m", "-s"])
        .arg_path(image)
        .args(["unit", "B", "print"])
        .error_msg("Failed to read partition table")
        .run_on(host)?;
    let last = last_partition_number(&table.stdout)
        .with_context(|| format!("No partitions found in {}", image.display()))?;

    Cmd::new("parted")
        .arg("-s")
        .arg_path(image)
        .args(["resizepart", &last.to_string(), "100%"])
        .error_msg(format!("Failed to resize partition {last}"))
        .run_on(host)?;

    let mut attachment = DeviceAttacher::new(host).attach_scoped(image)?;
    let root = attachment.partitions().root().to_path_buf();

    let fsck = Cmd::new("e2fsck")
        .args(["-f", "-y"])
        .arg_path(&root)
        .allow_fail()
        .run_on(host)?;
    match fsck.code {
        Some(code) if code <= E2FSCK_MAX_OK => {}
        _ => bail!(
            "e2fsck found uncorrectable errors on {} (exit code {}):\n{}",
            root.display(),
            fsck.exit_code(),
            fsck.stderr_trimmed()
        ),
    }

    Cmd::new("resize2fs")
        .arg_path(&root)
        .error_msg("resize2fs failed")
        .run_on(host)?;

    attachment.detach();
    Ok(new_size)
}

/// Extend the file with zeroes. Returns the new length.
fn grow_file(image: &Path, additional_bytes: u64) -> Result<u64> {
    let file = OpenOptions::new()
        .write(true)
        .open(image)
        .with_context(|| format!("Failed to open {}", image.display()))?;
    let current = file.metadata()?.len();
    let new_size = current
        .checked_add(additional_bytes)
        .context("Requested image size overflows")?;
    file.set_len(new_size)
        .with_context(|| format!("Failed to grow {}", image.display()))?;
    Ok(new_size)
}

/// Number of the last partition in `parted -m` output.
pub fn last_partition_number(output: &str) -> Option<u32> {
    output
        .lines()
        .filter_map(|line| line.split(':').next()?.trim().parse::<u32>().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use std::fs;

    fn image(len: u64) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(len).unwrap();
        file
    }

    #[test]
    fn test_gib_to_bytes() {
        assert_eq!(gib_to_bytes(2).unwrap(), 2 * GIB);
        assert!(gib_to_bytes(u64::MAX / 2).is_err());
    }

    #[test]
    fn test_last_partition_number() {
        let output = "BYT;\n/tmp/x.img:100B:file:512:512:msdos::;\n\
                      1:4B:40B:36B:fat32::lba;\n\
                      3:80B:99B:19B:ext4::;\n\
                      2:41B:79B:38B:ext4::;\n";
        assert_eq!(last_partition_number(output), Some(3));
        assert_eq!(last_partition_number("BYT;\n/tmp/x.img:100B:file:512:512:msdos::;\n"), None);
    }

    #[test]
    fn test_expand_runs_full_sequence() {
        let host = FakeHost::new();
        let img = image(1024);
        let result = expand(&host, img.path(), 4096);

        assert!(result.success);
        assert_eq!(result.new_size_bytes, 5120);
        assert_eq!(fs::metadata(img.path()).unwrap().len(), 5120);

        let order = [
            "unit B print",
            "resizepart 2 100%",
            "kpartx -av",
            "e2fsck -f -y /dev/mapper/loop0p2",
            "resize2fs /dev/mapper/loop0p2",
            "kpartx -d",
        ];
        let positions: Vec<usize> = order.iter().map(|p| host.position(p).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!host.is_mapped());
    }

    #[test]
    fn test_resize2fs_failure_is_warning_and_detaches() {
        let host = FakeHost::new().fail_on("resize2fs");
        let img = image(1024);
        let result = expand(&host, img.path(), 1024);

        assert!(!result.success);
        assert!(result.warning.unwrap().contains("resize2fs"));
        assert!(!host.is_mapped());
    }

    #[test]
    fn test_corrected_fsck_errors_are_accepted() {
        let host = FakeHost::new().fail_with("e2fsck", 1);
        let img = image(1024);
        assert!(expand(&host, img.path(), 1024).success);
    }

    #[test]
    fn test_uncorrectable_fsck_skips_resize() {
        let host = FakeHost::new().fail_with("e2fsck", 4);
        let img = image(1024);
        let result = expand(&host, img.path(), 1024);

        assert!(!result.success);
        assert_eq!(host.count("resize2fs"), 0);
        assert!(!host.is_mapped());
    }

    #[test]
    fn test_empty_partition_table_never_attaches() {
        let host = FakeHost::new().parted_print("BYT;\n/tmp/x.img:100B:file:512:512:msdos::;\n");
        let img = image(1024);
        let result = expand(&host, img.path(), 1024);

        assert!(!result.success);
        assert_eq!(host.count("kpartx"), 0);
    }

    #[test]
    fn test_missing_image_is_warning() {
        let host = FakeHost::new();
        let result = expand(&host, Path::new("/nonexistent/base.img"), GIB);
        assert!(!result.success);
        assert_eq!(result.new_size_bytes, 0);
        assert!(host.commands().is_empty());
    }
}
