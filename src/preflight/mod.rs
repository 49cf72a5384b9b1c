//! Preflight checks for a lemon-pi build.
//!
//! Validates privileges, host tools and the shared mount points before
//! anything touches device-mapper. Run with `lemon-pi preflight`.

mod environment;
mod host_tools;
pub mod types;

use std::path::Path;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::process::Host;

pub use host_tools::REQUIRED_TOOLS;
pub use types::{CheckReport, CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks. `work_dir` is where the output image goes.
pub fn run_preflight(host: &dyn Host, config: &Config, work_dir: &Path) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    checks.push(environment::check_root());

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    println!("Checking build environment...");
    checks.extend(environment::check_mount_points(host, config.mount_layout()));
    checks.push(environment::check_emulation());
    checks.push(environment::check_disk_space(host, work_dir));

    println!();

    CheckReport::new("Preflight Check Results", checks)
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(host: &dyn Host, config: &Config, work_dir: &Path) -> Result<()> {
    let report = run_preflight(host, config, work_dir);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
