//! Attach, mount, bind and expand against the fake host.

mod helpers;

use std::fs;

use helpers::TestEnv;
use lemon_pi::error::{AttachError, ImageError};
use lemon_pi::image::expand::{expand, GIB};
use lemon_pi::image::{release_by_path, MountedImage};
use lemon_pi::testing::FakeHost;

/// Open the image, bind a change-root, and drop both.
fn session(host: &FakeHost, env: &TestEnv) -> Result<(), ImageError> {
    let mounted = MountedImage::open(host, &env.base_image, env.config.mount_layout(), false)?;
    let _chroot = mounted.chroot()?;
    Ok(())
}

#[test]
fn test_lifecycle_ordering() {
    let env = TestEnv::new();
    let host = FakeHost::new();
    let boot = env.boot().display().to_string();
    let root = env.root().display().to_string();

    session(&host, &env).unwrap();

    let pos = |pattern: &str| {
        host.position(pattern)
            .unwrap_or_else(|| panic!("never ran: {pattern}"))
    };
    let attach = pos("kpartx -av");
    let mount_boot = pos(&format!("mount /dev/mapper/loop0p1 {boot}"));
    let mount_root = pos(&format!("mount /dev/mapper/loop0p2 {root}"));
    let bind_proc = pos("mount -t proc proc");
    let bind_run = pos("mount --rbind /run");
    let unbind_run = pos(&format!("umount -R {root}/run"));
    let unbind_proc = pos(&format!("umount -R {root}/proc"));
    let umount_root = pos(&format!("umount {root}"));
    let umount_boot = pos(&format!("umount {boot}"));
    let detach = pos("kpartx -d");

    assert!(attach < mount_boot);
    assert!(mount_boot < mount_root);
    assert!(mount_root < bind_proc);
    assert!(bind_proc < bind_run);
    assert!(bind_run < unbind_run);
    assert!(unbind_run < unbind_proc);
    assert!(unbind_proc < umount_root);
    assert!(umount_root < umount_boot);
    assert!(umount_boot < detach);

    assert!(host.mounted().is_empty());
    assert!(!host.is_mapped());
}

#[test]
fn test_every_injected_failure_unwinds_completely() {
    let failures = [
        "mount /dev/mapper/loop0p1",
        "mount /dev/mapper/loop0p2",
        "mount -t proc",
        "--rbind /sys",
        "--rbind /dev",
        "--rbind /run",
        "--make-rslave",
    ];

    for pattern in failures {
        let env = TestEnv::new();
        let host = FakeHost::new().fail_on(pattern);

        assert!(session(&host, &env).is_err(), "{pattern} should fail the session");
        assert!(
            host.mounted().is_empty(),
            "{pattern}: left mounted {:?}",
            host.mounted()
        );
        assert!(!host.is_mapped(), "{pattern}: left attached");
    }
}

#[test]
fn test_single_partition_image_is_rejected_before_mounting() {
    let env = TestEnv::new();
    let host = FakeHost::with_partitions(&["loop0p1"]);

    let err = session(&host, &env).unwrap_err();

    assert!(matches!(
        err,
        ImageError::Attach(AttachError::TooFewPartitions { found: 1, .. })
    ));
    assert!(host.position("mount /dev/mapper").is_none());
    assert!(!host.is_mapped());
}

#[test]
fn test_wrong_filesystem_roles_are_rejected() {
    let env = TestEnv::new();
    let host = FakeHost::new()
        .fs_type("loop0p1", "ext4")
        .fs_type("loop0p2", "vfat");

    let err = session(&host, &env).unwrap_err();

    assert!(matches!(err, ImageError::Attach(AttachError::RoleMismatch { .. })));
    assert!(!host.is_mapped());
}

#[test]
fn test_release_twice_is_a_noop() {
    let env = TestEnv::new();
    let host = FakeHost::new();

    let layout = MountedImage::open(&host, &env.base_image, env.config.mount_layout(), true)
        .unwrap()
        .persist();
    assert_eq!(host.mounted().len(), 2);

    release_by_path(&host, &env.base_image, &layout).unwrap();
    let after_first = host.count("umount");
    release_by_path(&host, &env.base_image, &layout).unwrap();

    assert_eq!(host.count("umount"), after_first);
    assert!(host.mounted().is_empty());
    assert!(!host.is_mapped());
}

#[test]
fn test_readonly_mount_passes_flag() {
    let env = TestEnv::new();
    let host = FakeHost::new();

    let mounted =
        MountedImage::open(&host, &env.base_image, env.config.mount_layout(), true).unwrap();
    mounted.release().unwrap();

    assert_eq!(host.count("mount -r /dev/mapper"), 2);
}

#[test]
fn test_expand_grows_file_and_filesystem() {
    let env = TestEnv::new();
    let host = FakeHost::new();
    let before = fs::metadata(&env.base_image).unwrap().len();

    let result = expand(&host, &env.base_image, GIB);

    assert!(result.success, "{:?}", result.warning);
    assert_eq!(result.new_size_bytes, before + GIB);
    assert_eq!(fs::metadata(&env.base_image).unwrap().len(), before + GIB);
    assert!(host.position("resizepart 2 100%").unwrap() < host.position("resize2fs").unwrap());
    assert!(!host.is_mapped());
}

#[test]
fn test_expand_failure_is_reported_not_raised() {
    let env = TestEnv::new();
    let host = FakeHost::new().fail_on("resizepart");

    let result = expand(&host, &env.base_image, GIB);

    assert!(!result.success);
    assert!(result.warning.unwrap().contains("resize partition 2"));
    assert!(host.position("kpartx").is_none());
}

#[test]
fn test_expand_interrupted_during_fsck_detaches() {
    let env = TestEnv::new();
    // e2fsck killed by SIGINT exits 130.
    let host = FakeHost::new().fail_with("e2fsck", 130);

    let result = expand(&host, &env.base_image, GIB);

    assert!(!result.success);
    assert!(host.position("resize2fs").is_none());
    assert!(host.position("e2fsck").unwrap() < host.position("kpartx -d").unwrap());
    assert!(!host.is_mapped());
}
