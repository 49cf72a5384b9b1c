//! Configuration management for lemon-pi.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Raspberry Pi OS Lite (arm64) base image the build starts from.
pub const DEFAULT_BASE_IMAGE_URL: &str = "https://downloads.raspberrypi.com/raspios_lite_arm64/images/raspios_lite_arm64-2025-12-04/2025-12-04-raspios-trixie-arm64-lite.img.xz";

const DEFAULT_GROUPS: &[&str] = &["sudo", "video", "plugdev", "netdev", "gpio", "i2c", "spi"];

const DEFAULT_PACKAGES: &[&str] = &[
    "python3-pip",
    "python3-venv",
    "cmake",
    "build-essential",
    "avahi-daemon",
    "avahi-utils",
    "indi-bin",
    "curl",
    "git",
    "libdbus-1-dev",
    "libglib2.0-dev",
    "libjpeg-dev",
    "zlib1g-dev",
];

/// Where the two partitions of the image being customized are mounted.
///
/// These are host-wide paths: only one build may use them at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountLayout {
    pub boot: PathBuf,
    pub root: PathBuf,
}

impl Default for MountLayout {
    fn default() -> Self {
        Self {
            boot: PathBuf::from("/mnt/part1"),
            root: PathBuf::from("/mnt/part2"),
        }
    }
}

/// Account created inside the image.
#[derive(Debug, Clone, Serialize)]
pub struct UserConfig {
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<String>,
}

/// The application installed into the image and run as a service.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    /// Service and venv name.
    pub name: String,
    /// pip requirement specifier.
    pub package: String,
    pub port: u16,
}

/// Lemon Pi configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub mounts: MountLayout,
    pub user: UserConfig,
    pub hostname: String,
    pub locale: String,
    pub timezone: String,
    pub keyboard: String,
    pub packages: Vec<String>,
    pub app: AppConfig,
    /// Extra space added to the image before customization, in GiB.
    pub expand_gb: u64,
    pub image_version: String,
    pub output_prefix: String,
    pub base_image_url: String,
}

impl Config {
    /// Load configuration from `.env` in `base_dir` and the environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            let entries = dotenvy::from_path_iter(&env_path)
                .with_context(|| format!("Failed to read {}", env_path.display()))?;
            for entry in entries {
                let (key, value) =
                    entry.with_context(|| format!("Malformed line in {}", env_path.display()))?;
                vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        vars.extend(std::env::vars());

        Self::from_vars(&vars)
    }

    /// Build a configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str, default: &str| -> String {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let list = |key: &str, default: &[&str]| -> Vec<String> {
            match vars.get(key) {
                Some(v) => v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                None => default.iter().map(|s| s.to_string()).collect(),
            }
        };

        let mounts = MountLayout {
            boot: PathBuf::from(get("BOOT_MOUNT", "/mnt/part1")),
            root: PathBuf::from(get("ROOTFS_MOUNT", "/mnt/part2")),
        };
        if mounts.boot == mounts.root {
            anyhow::bail!(
                "BOOT_MOUNT and ROOTFS_MOUNT must differ (both are {})",
                mounts.boot.display()
            );
        }

        let user = UserConfig {
            name: get("IMAGE_USER", "citra"),
            password: get("IMAGE_PASSWORD", "citra"),
            uid: parse_number(vars, "IMAGE_UID", 1001)?,
            gid: parse_number(vars, "IMAGE_GID", 1001)?,
            groups: list("IMAGE_GROUPS", DEFAULT_GROUPS),
        };

        let app = AppConfig {
            name: get("APP_NAME", "citrascope"),
            package: get("APP_PACKAGE", "citrascope[indi]"),
            port: parse_number(vars, "APP_PORT", 24872)?,
        };

        Ok(Self {
            mounts,
            user,
            hostname: get("IMAGE_HOSTNAME", "citrascope"),
            locale: get("IMAGE_LOCALE", "en_US.UTF-8"),
            timezone: get("IMAGE_TIMEZONE", "UTC"),
            keyboard: get("IMAGE_KEYBOARD", "us"),
            packages: list("IMAGE_PACKAGES", DEFAULT_PACKAGES),
            app,
            expand_gb: parse_number(vars, "EXPAND_GB", 2)?,
            image_version: get("IMAGE_VERSION", "dev"),
            output_prefix: get("OUTPUT_PREFIX", "citrascope-pi"),
            base_image_url: get("BASE_IMAGE_URL", DEFAULT_BASE_IMAGE_URL),
        })
    }

    /// The fixed mount points every step works against.
    pub fn mount_layout(&self) -> &MountLayout {
        &self.mounts
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  BOOT_MOUNT:     {}", self.mounts.boot.display());
        println!("  ROOTFS_MOUNT:   {}", self.mounts.root.display());
        println!(
            "  IMAGE_USER:     {} (uid {}, gid {})",
            self.user.name, self.user.uid, self.user.gid
        );
        println!("  IMAGE_PASSWORD: ********");
        println!("  IMAGE_GROUPS:   {}", self.user.groups.join(","));
        println!("  IMAGE_HOSTNAME: {}", self.hostname);
        println!("  IMAGE_LOCALE:   {}", self.locale);
        println!("  IMAGE_TIMEZONE: {}", self.timezone);
        println!("  IMAGE_KEYBOARD: {}", self.keyboard);
        println!("  IMAGE_PACKAGES: {} packages", self.packages.len());
        println!("  APP:            {} ({}) on port {}", self.app.name, self.app.package, self.app.port);
        println!("  EXPAND_GB:      {}", self.expand_gb);
        println!("  IMAGE_VERSION:  {}", self.image_version);
        println!("  OUTPUT_PREFIX:  {}", self.output_prefix);
        println!("  BASE_IMAGE_URL: {}", self.base_image_url);
    }
}

fn parse_number<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        None => Ok(default),
    }
}
