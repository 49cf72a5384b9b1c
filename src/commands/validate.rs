//! Validate command - inspects a built image read-only.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::process::Host;
use crate::validate;

/// Execute the validate command. Returns whether every check passed.
pub fn cmd_validate(host: &dyn Host, image: &Path, config: &Config) -> Result<bool> {
    let report = validate::validate(host, image, config)
        .with_context(|| format!("Failed to inspect {}", image.display()))?;
    report.print();
    Ok(report.all_passed())
}
