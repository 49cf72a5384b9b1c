//! Read-only inspection of a built image.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::ImageError;
use crate::image::MountedImage;
use crate::preflight::{CheckReport, CheckResult};
use crate::process::Host;
use crate::steps::software::{unit_name, venv_path};
use crate::steps::ssh::SSH_UNIT;
use crate::steps::systemd::{is_enabled, Target};
use crate::steps::wifi::WIFI_UNIT;

/// Mount `image` read-only and check what the build should have produced.
/// The mounts are released before returning.
pub fn validate(host: &dyn Host, image: &Path, config: &Config) -> Result<CheckReport, ImageError> {
    let mounted = MountedImage::open(host, image, config.mount_layout(), true)?;
    let report = check_rootfs(mounted.root(), config);
    mounted.release()?;
    Ok(report)
}

/// Run the image checks against a root filesystem tree.
pub fn check_rootfs(root: &Path, config: &Config) -> CheckReport {
    let user = &config.user;
    let app = &config.app;
    let read = |rel: &str| fs::read_to_string(root.join(rel)).unwrap_or_default();

    let passwd = read("etc/passwd");
    let entry = passwd
        .lines()
        .find(|l| l.split(':').next() == Some(user.name.as_str()));
    let uid = entry.and_then(|l| l.split(':').nth(2));

    let group = read("etc/group");
    let in_sudo = group
        .lines()
        .find(|l| l.starts_with("sudo:"))
        .and_then(|l| l.split(':').nth(3))
        .is_some_and(|members| members.split(',').any(|m| m == user.name));

    let hostname = read("etc/hostname");
    let venv = venv_path(user, app);
    let venv_rel = venv.trim_start_matches('/');
    let unit = unit_name(app);

    let checks = vec![
        CheckResult::check(
            &format!("user '{}' exists", user.name),
            entry.is_some(),
            "no entry in /etc/passwd",
        ),
        CheckResult::check(
            &format!("user has UID {}", user.uid),
            uid == Some(user.uid.to_string().as_str()),
            &format!("found {}", uid.unwrap_or("none")),
        ),
        CheckResult::check("user in sudo group", in_sudo, "not a member of sudo"),
        CheckResult::check(
            "SSH enabled",
            is_enabled(root, SSH_UNIT, Target::MultiUser),
            "ssh.service not in multi-user.target.wants",
        ),
        CheckResult::check(
            "hostname set",
            hostname.trim() == config.hostname,
            &format!("expected '{}', found '{}'", config.hostname, hostname.trim()),
        ),
        CheckResult::check(
            &format!("{} venv exists", app.name),
            root.join(venv_rel).is_dir(),
            &format!("{venv} missing"),
        ),
        CheckResult::check(
            &format!("{} binary exists", app.name),
            root.join(venv_rel).join("bin").join(&app.name).is_file(),
            &format!("{venv}/bin/{} missing", app.name),
        ),
        CheckResult::check(
            &format!("{unit} exists"),
            root.join("etc/systemd/system").join(&unit).is_file(),
            "unit file missing",
        ),
        CheckResult::check(
            &format!("{unit} enabled"),
            is_enabled(root, &unit, Target::MultiUser),
            "not in multi-user.target.wants",
        ),
        CheckResult::check(
            "WiFi radio enabled",
            is_enabled(root, WIFI_UNIT, Target::NetworkManager),
            "wifi-on.service not in NetworkManager.service.wants",
        ),
    ];

    CheckReport::new("Image Validation", checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::CheckStatus;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_empty_rootfs_fails_everything() {
        let root = TempDir::new().unwrap();
        let config = Config::from_vars(&HashMap::new()).unwrap();
        let report = check_rootfs(root.path(), &config);

        assert_eq!(report.fail_count(), report.checks.len());
    }

    #[test]
    fn test_validate_releases_image() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("out.img");
        fs::write(&image, b"img").unwrap();
        let config = Config::from_vars(&HashMap::from([
            ("BOOT_MOUNT".to_string(), dir.path().join("boot").display().to_string()),
            ("ROOTFS_MOUNT".to_string(), dir.path().join("root").display().to_string()),
        ]))
        .unwrap();
        let host = crate::testing::FakeHost::new();

        let report = validate(&host, &image, &config).unwrap();

        assert!(!report.all_passed());
        assert_eq!(host.count("mount -r /dev/mapper"), 2);
        assert!(host.mounted().is_empty());
        assert!(!host.is_mapped());
    }

    #[test]
    fn test_uid_mismatch_reported() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(
            root.path().join("etc/passwd"),
            "citra:x:1000:1000::/home/citra:/bin/bash\n",
        )
        .unwrap();
        let config = Config::from_vars(&HashMap::new()).unwrap();
        let report = check_rootfs(root.path(), &config);

        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert_eq!(report.checks[1].status, CheckStatus::Fail);
        assert_eq!(report.checks[1].details.as_deref(), Some("found 1000"));
    }
}
