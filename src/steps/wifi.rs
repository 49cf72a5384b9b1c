//! Turn the WiFi radio on at boot, whatever the regulatory domain.

use anyhow::Result;

use super::systemd::{self, Target};
use crate::pipeline::StepContext;

pub const WIFI_UNIT: &str = "wifi-on.service";

const WIFI_UNIT_CONTENT: &str = "[Unit]
Description=Turn wifi on, regardless of regulatory domain
After=network.target network-online.target
Wants=network-online.target

[Service]
Type=oneshot
ExecStart=/usr/bin/nmcli radio wifi on

[Install]
WantedBy=NetworkManager.service
";

pub fn enable(ctx: &StepContext<'_>) -> Result<()> {
    systemd::write_unit(ctx.root(), WIFI_UNIT, WIFI_UNIT_CONTENT)?;
    systemd::enable(
        ctx.root(),
        WIFI_UNIT,
        &format!("/etc/systemd/system/{WIFI_UNIT}"),
        Target::NetworkManager,
    )?;
    println!("  Enabled {WIFI_UNIT}");
    Ok(())
}
