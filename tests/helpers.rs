//! Shared test utilities for lemon-pi tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use lemon_pi::commands::BuildOptions;
use lemon_pi::config::Config;

/// Test environment: a base image, an output path and mount points, all
/// inside one temporary directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub dir: PathBuf,
    /// Stand-in for the decompressed base image
    pub base_image: PathBuf,
    /// Where the build writes its copy
    pub output: PathBuf,
    pub config: Config,
}

impl TestEnv {
    /// Create a new test environment with default configuration.
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    /// Create a test environment with extra configuration variables.
    pub fn with_vars(extra: &[(&str, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().to_path_buf();

        let base_image = dir.join("raspios-lite.img");
        fs::write(&base_image, b"not really a disk image").expect("Failed to create base image");

        let mut vars: HashMap<String, String> = HashMap::from([
            ("BOOT_MOUNT".to_string(), dir.join("mnt/part1").display().to_string()),
            ("ROOTFS_MOUNT".to_string(), dir.join("mnt/part2").display().to_string()),
        ]);
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let config = Config::from_vars(&vars).expect("Failed to build config");

        Self {
            _temp_dir: temp_dir,
            output: dir.join("out.img"),
            dir,
            base_image,
            config,
        }
    }

    pub fn boot(&self) -> &Path {
        &self.config.mounts.boot
    }

    pub fn root(&self) -> &Path {
        &self.config.mounts.root
    }

    /// Build options pointing at this environment, expansion skipped.
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            image: Some(self.base_image.clone()),
            output: Some(self.output.clone()),
            skip_expand: true,
            expand_gb: None,
        }
    }
}

/// Create a minimal Raspberry Pi OS root filesystem at `rootfs`.
///
/// The fake host does not really mount anything, so tests lay the tree out
/// directly at the root mount point.
pub fn create_mock_rootfs(rootfs: &Path) {
    let dirs = [
        "etc/skel",
        "etc/default",
        "etc/systemd/system",
        "lib/systemd/system",
        "home",
        "usr/sbin",
    ];
    for dir in dirs {
        fs::create_dir_all(rootfs.join(dir)).expect("Failed to create mock rootfs dir");
    }

    fs::write(
        rootfs.join("etc/passwd"),
        "root:x:0:0:root:/root:/bin/bash\npi:x:1000:1000::/home/pi:/bin/bash\n",
    )
    .expect("Failed to create passwd");
    fs::write(
        rootfs.join("etc/group"),
        "root:x:0:\nsudo:x:27:\nvideo:x:44:pi\nplugdev:x:46:\nnetdev:x:108:\ngpio:x:997:\n",
    )
    .expect("Failed to create group");
    fs::write(rootfs.join("etc/shadow"), "root:*:19000:0:99999:7:::\n")
        .expect("Failed to create shadow");
    fs::write(
        rootfs.join("etc/hosts"),
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\traspberrypi\n",
    )
    .expect("Failed to create hosts");
    fs::write(rootfs.join("etc/hostname"), "raspberrypi\n").expect("Failed to create hostname");
    fs::write(
        rootfs.join("etc/locale.gen"),
        "# en_GB.UTF-8 UTF-8\n# en_US.UTF-8 UTF-8\n",
    )
    .expect("Failed to create locale.gen");
    fs::write(rootfs.join("etc/skel/.bashrc"), "# ~/.bashrc\n").expect("Failed to create skel");
    fs::write(
        rootfs.join("lib/systemd/system/ssh.service"),
        "[Unit]\nDescription=OpenBSD Secure Shell server\n",
    )
    .expect("Failed to create ssh.service");
}

/// Pretend the application's venv was populated by pip.
pub fn create_mock_venv(rootfs: &Path, user: &str, app: &str) {
    let bin = rootfs.join(format!("home/{user}/.{app}_venv/bin"));
    fs::create_dir_all(&bin).expect("Failed to create venv");
    fs::write(bin.join(app), "#!/bin/sh\n").expect("Failed to create app binary");
}

/// Read `<image>.build.json`.
pub fn read_build_record(image: &Path) -> serde_json::Value {
    let path = PathBuf::from(format!("{}.build.json", image.display()));
    let text = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Failed to read {}", path.display()));
    serde_json::from_str(&text).expect("Build record is not JSON")
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read file: {}", path.display()));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}
