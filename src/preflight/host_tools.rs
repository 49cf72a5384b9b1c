//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the build invokes on the host: (tool, package, purpose).
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("kpartx", "kpartx", "Required to map image partitions"),
    ("mount", "mount", "Required to mount partitions"),
    ("umount", "mount", "Required to unmount partitions"),
    ("mountpoint", "util-linux", "Required to detect active mounts"),
    ("blkid", "util-linux", "Required to verify partition roles"),
    ("parted", "parted", "Required to grow the root partition"),
    ("e2fsck", "e2fsprogs", "Required to check the root filesystem"),
    ("resize2fs", "e2fsprogs", "Required to grow the root filesystem"),
    ("chroot", "coreutils", "Required to run commands inside the image"),
    ("chown", "coreutils", "Required to hand the home directory to the user"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose, true))
        .collect()
}

/// Check if a tool exists in PATH.
pub(super) fn check_tool_exists(
    tool: &str,
    package: &str,
    purpose: &str,
    required: bool,
) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}
