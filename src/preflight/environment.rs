//! Build environment checks (privileges, mount points, emulation, disk space).

use std::path::Path;

use crate::config::MountLayout;
use crate::image::mount::is_mounted;
use crate::process::{Cmd, Host};

use super::host_tools::check_tool_exists;
use super::types::CheckResult;

const BINFMT_AARCH64: &str = "/proc/sys/fs/binfmt_misc/qemu-aarch64";

/// Free space below which the build is likely to run out.
const MIN_FREE_GB: u64 = 8;

pub fn check_root() -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        CheckResult::pass("running as root")
    } else {
        CheckResult::fail(
            "running as root",
            &format!("euid is {euid}; kpartx and mount need root (run with sudo)"),
        )
    }
}

/// The fixed mount points must be free: a mounted one means another build
/// (or a leftover `mount`) holds them.
pub fn check_mount_points(host: &dyn Host, layout: &MountLayout) -> Vec<CheckResult> {
    [("boot mount point", &layout.boot), ("root mount point", &layout.root)]
        .into_iter()
        .map(|(name, path)| {
            if is_mounted(host, path) {
                CheckResult::fail(
                    name,
                    &format!(
                        "{} is mounted; run `lemon-pi unmount <image>` or wait for the other build",
                        path.display()
                    ),
                )
            } else {
                CheckResult::pass_with(name, &path.display().to_string())
            }
        })
        .collect()
}

/// Commands inside an arm64 image need an arm64 host or binfmt emulation.
pub fn check_emulation() -> CheckResult {
    if std::env::consts::ARCH == "aarch64" {
        return CheckResult::pass_with("arm64 execution", "native");
    }
    if Path::new(BINFMT_AARCH64).exists() {
        return CheckResult::pass_with("arm64 execution", "binfmt qemu-aarch64");
    }
    let tool = check_tool_exists(
        "qemu-aarch64-static",
        "qemu-user-static",
        "Required to run arm64 tools in the change-root",
        false,
    );
    CheckResult {
        name: "arm64 execution".to_string(),
        ..tool
    }
}

pub fn check_disk_space(host: &dyn Host, dir: &Path) -> CheckResult {
    let result = Cmd::new("df")
        .args(["--output=avail", "-B1"])
        .arg_path(dir)
        .allow_fail()
        .run_on(host);

    let avail = result
        .ok()
        .filter(|r| r.success())
        .and_then(|r| r.stdout.lines().nth(1).and_then(|l| l.trim().parse::<u64>().ok()));

    match avail {
        Some(bytes) => {
            let free_gb = bytes / (1024 * 1024 * 1024);
            if free_gb < MIN_FREE_GB {
                CheckResult::warn(
                    "disk space",
                    &format!("{free_gb}GB free - build needs ~{MIN_FREE_GB}GB"),
                )
            } else {
                CheckResult::pass_with("disk space", &format!("{free_gb}GB free"))
            }
        }
        None => CheckResult::skip("disk space", "could not query df"),
    }
}
