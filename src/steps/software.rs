//! The application: a Python virtualenv owned by the image user and a
//! systemd service that runs it.

use anyhow::Result;

use super::overlay::FileOverlay;
use super::systemd::{self, Target};
use crate::config::{AppConfig, UserConfig};
use crate::image::ChrootGuard;
use crate::pipeline::{StepContext, StepOutcome};
use crate::process::Cmd;

/// Where the virtualenv lives inside the image.
pub fn venv_path(user: &UserConfig, app: &AppConfig) -> String {
    format!("/home/{}/.{}_venv", user.name, app.name)
}

pub fn unit_name(app: &AppConfig) -> String {
    format!("{}.service", app.name)
}

/// Install the application and enable its service. Reports the installed
/// version as `version` when pip knows it.
pub fn install(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let config = ctx.config();
    let (user, app) = (&config.user, &config.app);

    let home = ctx.rootfs(&format!("home/{}", user.name));
    if !home.is_dir() {
        return Ok(StepOutcome::failure(format!(
            "home directory /home/{} missing; the user must be created first",
            user.name
        )));
    }

    let venv = venv_path(user, app);
    let version = {
        let _dns = FileOverlay::host_dns(ctx.root())?;
        let chroot = ctx.chroot()?;

        as_user(&chroot, user, &["python3", "-m", "venv", &venv])?;
        let pip = format!("{venv}/bin/pip");
        as_user(&chroot, user, &[&pip, "install", "--upgrade", "pip"])?;
        as_user(&chroot, user, &[&pip, "install", &app.package])?;

        let show = chroot.exec(
            chroot
                .command(&pip)
                .args(["show", distribution_name(&app.package)])
                .allow_fail(),
        )?;
        parse_pip_version(&show.stdout)
    };

    Cmd::new("chown")
        .arg("-R")
        .arg(format!("{}:{}", user.uid, user.gid))
        .arg_path(&home)
        .error_msg("Failed to set home directory ownership")
        .run_on(ctx.host())?;

    let unit = unit_name(app);
    systemd::write_unit(ctx.root(), &unit, &service_unit(user, app, &venv))?;
    systemd::enable(
        ctx.root(),
        &unit,
        &format!("/etc/systemd/system/{unit}"),
        Target::MultiUser,
    )?;
    println!("  Enabled {unit}");

    match version {
        Some(version) => {
            println!("  {} v{} installed", app.name, version);
            Ok(StepOutcome::with("version", version))
        }
        None => {
            tracing::warn!(package = %app.package, "could not determine installed version");
            Ok(StepOutcome::success())
        }
    }
}

fn as_user(chroot: &ChrootGuard<'_>, user: &UserConfig, argv: &[&str]) -> Result<()> {
    chroot.exec(
        chroot
            .command("runuser")
            .args(["-u", &user.name, "--"])
            .args(argv)
            .streaming()
            .error_msg(format!("{} failed", argv.join(" "))),
    )?;
    Ok(())
}

/// `citrascope[indi]>=1.0` -> `citrascope`.
fn distribution_name(requirement: &str) -> &str {
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(requirement.len());
    &requirement[..end]
}

/// The `Version:` field of `pip show` output.
fn parse_pip_version(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn service_unit(user: &UserConfig, app: &AppConfig, venv: &str) -> String {
    let capabilities = if app.port < 1024 {
        "AmbientCapabilities=CAP_NET_BIND_SERVICE\n"
    } else {
        ""
    };
    format!(
        "[Unit]\n\
         Description={name} daemon\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         User={user}\n\
         WorkingDirectory=/home/{user}\n\
         ExecStart={venv}/bin/{name} --web-port {port}\n\
         Restart=on-failure\n\
         {capabilities}\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        name = app.name,
        user = user.name,
        port = app.port,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashMap;

    #[test]
    fn test_distribution_name() {
        assert_eq!(distribution_name("citrascope[indi]"), "citrascope");
        assert_eq!(distribution_name("my_app>=1.2"), "my_app");
        assert_eq!(distribution_name("plain"), "plain");
    }

    #[test]
    fn test_parse_pip_version() {
        let output = "Name: citrascope\nVersion: 0.9.3\nSummary: Telescope control\n";
        assert_eq!(parse_pip_version(output), Some("0.9.3".to_string()));
        assert_eq!(parse_pip_version("WARNING: Package(s) not found: x\n"), None);
        assert_eq!(parse_pip_version("Version:\n"), None);
    }

    #[test]
    fn test_service_unit_privileged_port() {
        let mut config = Config::from_vars(&HashMap::new()).unwrap();
        let venv = venv_path(&config.user, &config.app);
        assert_eq!(venv, "/home/citra/.citrascope_venv");

        let unit = service_unit(&config.user, &config.app, &venv);
        assert!(unit.contains("ExecStart=/home/citra/.citrascope_venv/bin/citrascope --web-port 24872\n"));
        assert!(!unit.contains("CAP_NET_BIND_SERVICE"));

        config.app.port = 80;
        let unit = service_unit(&config.user, &config.app, &venv);
        assert!(unit.contains("AmbientCapabilities=CAP_NET_BIND_SERVICE\n"));
    }
}
