//! The image's login user.
//!
//! Account databases are edited in place so the step needs no tools from
//! the image except `chpasswd`, which hashes the password the way the
//! image's PAM stack expects.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::config::UserConfig;
use crate::pipeline::StepContext;
use crate::process::Cmd;

const LOGIN_SHELL: &str = "/bin/bash";

/// Create the configured user with home, groups, password and sudo rights.
pub fn add(ctx: &StepContext<'_>) -> Result<()> {
    let user = &ctx.config().user;
    let etc = ctx.rootfs("etc");

    ensure_entry(
        &etc.join("passwd"),
        &user.name,
        &format!(
            "{}:x:{}:{}::/home/{}:{}",
            user.name, user.uid, user.gid, user.name, LOGIN_SHELL
        ),
    )?;
    ensure_entry(
        &etc.join("group"),
        &user.name,
        &format!("{}:x:{}:", user.name, user.gid),
    )?;
    // Locked until chpasswd sets the real hash below
    ensure_entry(
        &etc.join("shadow"),
        &user.name,
        &format!("{}:!:{}:0:99999:7:::", user.name, days_since_epoch()),
    )?;
    println!("  Added {} (uid {}, gid {})", user.name, user.uid, user.gid);

    let joined = add_to_groups(&etc.join("group"), &user.name, &user.groups)?;
    println!("  Supplementary groups: {}", joined.join(", "));

    create_home(ctx, user)?;
    write_sudoers(&etc, &user.name)?;
    set_password(ctx, user)?;
    Ok(())
}

fn days_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 86_400)
        .unwrap_or(0)
}

/// Append `line` to the colon-separated database at `path` unless an entry
/// for `name` already exists.
fn ensure_entry(path: &Path, name: &str, line: &str) -> Result<()> {
    let mut content = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let prefix = format!("{name}:");
    if content.lines().any(|l| l.starts_with(&prefix)) {
        tracing::debug!(file = %path.display(), name, "entry already present");
        return Ok(());
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(line);
    content.push('\n');
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Add `user` to each of `groups` that exists in the group file. Returns
/// the groups the user is now a member of.
fn add_to_groups(group_path: &Path, user: &str, groups: &[String]) -> Result<Vec<String>> {
    let content = fs::read_to_string(group_path)
        .with_context(|| format!("Failed to read {}", group_path.display()))?;

    let mut joined = Vec::new();
    let mut lines = Vec::new();
    for line in content.lines() {
        let name = line.split(':').next().unwrap_or_default();
        if !groups.iter().any(|g| g == name) {
            lines.push(line.to_string());
            continue;
        }

        let fields: Vec<&str> = line.splitn(4, ':').collect();
        if fields.len() < 3 {
            tracing::warn!(line, "malformed group entry left unchanged");
            lines.push(line.to_string());
            continue;
        }
        let members = fields.get(3).copied().unwrap_or_default();
        let already = members.split(',').any(|m| m == user);
        let updated = if already {
            line.to_string()
        } else if members.is_empty() {
            format!("{}:{}", fields[..3].join(":"), user)
        } else {
            format!("{}:{},{}", fields[..3].join(":"), members, user)
        };
        joined.push(name.to_string());
        lines.push(updated);
    }

    for missing in groups.iter().filter(|g| !joined.contains(g)) {
        tracing::warn!(group = %missing, "group not present in image, skipped");
    }

    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(group_path, text)
        .with_context(|| format!("Failed to write {}", group_path.display()))?;
    Ok(joined)
}

/// Populate `/home/<user>` from `/etc/skel` and hand it to the user.
fn create_home(ctx: &StepContext<'_>, user: &UserConfig) -> Result<()> {
    let home = ctx.rootfs(&format!("home/{}", user.name));
    fs::create_dir_all(&home)?;

    let skel = ctx.rootfs("etc/skel");
    if skel.is_dir() {
        for entry in WalkDir::new(&skel).min_depth(1) {
            let entry = entry.with_context(|| format!("Failed to walk {}", skel.display()))?;
            let rel = entry.path().strip_prefix(&skel)?;
            let dest = home.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else if entry.file_type().is_file() {
                fs::copy(entry.path(), &dest)
                    .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            }
        }
    }

    Cmd::new("chown")
        .arg("-R")
        .arg(format!("{}:{}", user.uid, user.gid))
        .arg_path(&home)
        .error_msg("Failed to set home directory ownership")
        .run_on(ctx.host())?;
    println!("  Created /home/{}", user.name);
    Ok(())
}

fn write_sudoers(etc: &Path, user: &str) -> Result<()> {
    let dir = etc.join("sudoers.d");
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("010_{user}-nopasswd"));
    fs::write(&path, format!("{user} ALL=(ALL) NOPASSWD: ALL\n"))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o440))?;
    Ok(())
}

fn set_password(ctx: &StepContext<'_>, user: &UserConfig) -> Result<()> {
    let chroot = ctx.chroot()?;
    let cmd = chroot
        .command("chpasswd")
        .stdin(format!("{}:{}\n", user.name, user.password))
        .error_msg("chpasswd failed");
    chroot.exec(cmd)?;
    Ok(())
}
