//! SSH server enablement.

use anyhow::Result;

use super::systemd::{self, Target};
use crate::pipeline::{StepContext, StepOutcome};

pub const SSH_UNIT: &str = "ssh.service";
const SSH_UNIT_PATH: &str = "/lib/systemd/system/ssh.service";

/// Enable `ssh.service` for multi-user boot. Fails if the image does not
/// ship the unit.
pub fn enable(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    if !ctx.rootfs(SSH_UNIT_PATH).exists() {
        return Ok(StepOutcome::failure(format!(
            "SSH unit not found at {SSH_UNIT_PATH} in image"
        )));
    }
    systemd::enable(ctx.root(), SSH_UNIT, SSH_UNIT_PATH, Target::MultiUser)?;
    println!("  Enabled {SSH_UNIT}");
    Ok(StepOutcome::success())
}
