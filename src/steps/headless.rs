//! Locale, timezone and keyboard, so the first boot needs no wizard.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::symlink;

use crate::pipeline::StepContext;

pub fn configure(ctx: &StepContext<'_>) -> Result<()> {
    let config = ctx.config();
    fs::create_dir_all(ctx.rootfs("etc/default"))?;

    configure_locale(ctx, &config.locale)?;
    configure_timezone(ctx, &config.timezone)?;
    configure_keyboard(ctx, &config.keyboard)?;
    Ok(())
}

fn configure_locale(ctx: &StepContext<'_>, locale: &str) -> Result<()> {
    let locale_gen = ctx.rootfs("etc/locale.gen");
    let content = if locale_gen.exists() {
        fs::read_to_string(&locale_gen)
            .with_context(|| format!("Failed to read {}", locale_gen.display()))?
    } else {
        String::new()
    };
    fs::write(&locale_gen, enable_locale(&content, locale))
        .with_context(|| format!("Failed to write {}", locale_gen.display()))?;

    fs::write(
        ctx.rootfs("etc/default/locale"),
        format!("LANG={locale}\nLC_ALL={locale}\n"),
    )?;

    let chroot = ctx.chroot()?;
    chroot.exec(
        chroot
            .command("locale-gen")
            .error_msg("locale-gen failed"),
    )?;
    println!("  Locale: {locale}");
    Ok(())
}

/// Uncomment `locale`'s line in locale.gen, appending it if missing.
fn enable_locale(content: &str, locale: &str) -> String {
    let encoding = locale.split_once('.').map(|(_, e)| e).unwrap_or("UTF-8");
    let base = locale.split('.').next().unwrap_or(locale);
    let wanted = format!("{base}.{encoding} {encoding}");

    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let bare = line.trim().trim_start_matches('#').trim();
            if bare == wanted {
                found = true;
                wanted.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push(wanted);
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn configure_timezone(ctx: &StepContext<'_>, timezone: &str) -> Result<()> {
    fs::write(ctx.rootfs("etc/timezone"), format!("{timezone}\n"))?;

    let localtime = ctx.rootfs("etc/localtime");
    if localtime.exists() || localtime.is_symlink() {
        fs::remove_file(&localtime)?;
    }
    symlink(format!("/usr/share/zoneinfo/{timezone}"), &localtime)
        .with_context(|| format!("Failed to link {}", localtime.display()))?;
    println!("  Timezone: {timezone}");
    Ok(())
}

fn configure_keyboard(ctx: &StepContext<'_>, layout: &str) -> Result<()> {
    fs::write(
        ctx.rootfs("etc/default/keyboard"),
        format!(
            "XKBLAYOUT=\"{layout}\"\nXKBMODEL=\"pc105\"\nXKBVARIANT=\"\"\nXKBOPTIONS=\"\"\nBACKSPACE=\"guess\"\n"
        ),
    )?;
    println!("  Keyboard: {layout}");
    Ok(())
}
