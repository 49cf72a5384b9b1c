//! System package update and install inside the image.

use anyhow::Result;

use super::overlay::{FileOverlay, POLICY_RC_D};
use crate::image::ChrootGuard;
use crate::pipeline::StepContext;
use crate::process::CommandResult;

/// `apt-get update`, `upgrade`, `install` the configured packages, `clean`.
pub fn update(ctx: &StepContext<'_>) -> Result<()> {
    let packages = &ctx.config().packages;

    // Dropped in reverse: binds first, then the overlays are restored.
    let _policy = FileOverlay::install(
        &ctx.rootfs("usr/sbin/policy-rc.d"),
        POLICY_RC_D.as_bytes(),
        0o755,
    )?;
    let _dns = FileOverlay::host_dns(ctx.root())?;
    let chroot = ctx.chroot()?;

    apt_get(&chroot, &["update"])?;
    apt_get(&chroot, &["upgrade", "-y"])?;
    if packages.is_empty() {
        tracing::info!("no extra packages configured");
    } else {
        let mut install = vec!["install", "-y"];
        install.extend(packages.iter().map(String::as_str));
        apt_get(&chroot, &install)?;
    }
    apt_get(&chroot, &["clean"])?;

    println!("  Installed {} packages", packages.len());
    Ok(())
}

fn apt_get(chroot: &ChrootGuard<'_>, args: &[&str]) -> Result<CommandResult> {
    println!("  apt-get {}", args.join(" "));
    chroot.exec(
        chroot
            .command("apt-get")
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .streaming()
            .error_msg(format!("apt-get {} failed", args.first().copied().unwrap_or_default())),
    )
}
