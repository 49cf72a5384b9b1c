//! Hostname and `/etc/hosts`.

use anyhow::{Context, Result};
use std::fs;

use crate::pipeline::StepContext;

const LOOPBACK_ALIAS: &str = "127.0.1.1";

/// Write `/etc/hostname` and point the `127.0.1.1` alias at it.
pub fn configure(ctx: &StepContext<'_>) -> Result<()> {
    let hostname = &ctx.config().hostname;
    let etc = ctx.rootfs("etc");
    fs::create_dir_all(&etc)?;

    let hostname_path = etc.join("hostname");
    fs::write(&hostname_path, format!("{hostname}\n"))
        .with_context(|| format!("Failed to write {}", hostname_path.display()))?;

    let hosts_path = etc.join("hosts");
    let hosts = if hosts_path.exists() {
        fs::read_to_string(&hosts_path)
            .with_context(|| format!("Failed to read {}", hosts_path.display()))?
    } else {
        String::new()
    };
    fs::write(&hosts_path, rewrite_hosts(&hosts, hostname))
        .with_context(|| format!("Failed to write {}", hosts_path.display()))?;

    println!("  Hostname set to '{hostname}' ({hostname}.local)");
    Ok(())
}

/// Replace the `127.0.1.1` line, or append one if there is none.
fn rewrite_hosts(hosts: &str, hostname: &str) -> String {
    let entry = format!("{LOOPBACK_ALIAS}\t{hostname}");
    let mut found = false;
    let mut out: Vec<String> = hosts
        .lines()
        .map(|line| {
            if line.starts_with(LOOPBACK_ALIAS) {
                found = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        out.push(entry);
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_existing_alias() {
        let hosts = "127.0.0.1\tlocalhost\n127.0.1.1\traspberrypi\n::1\tlocalhost\n";
        assert_eq!(
            rewrite_hosts(hosts, "citrascope"),
            "127.0.0.1\tlocalhost\n127.0.1.1\tcitrascope\n::1\tlocalhost\n"
        );
    }

    #[test]
    fn test_appends_missing_alias() {
        assert_eq!(
            rewrite_hosts("127.0.0.1\tlocalhost\n", "pi"),
            "127.0.0.1\tlocalhost\n127.0.1.1\tpi\n"
        );
        assert_eq!(rewrite_hosts("", "pi"), "127.0.1.1\tpi\n");
    }
}
