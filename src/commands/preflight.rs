//! Preflight command - runs preflight checks.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::preflight;
use crate::process::Host;

/// Execute the preflight command.
pub fn cmd_preflight(host: &dyn Host, config: &Config, work_dir: &Path, strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(host, config, work_dir)?;
    } else {
        let report = preflight::run_preflight(host, config, work_dir);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to exit non-zero.");
        }
    }
    Ok(())
}
