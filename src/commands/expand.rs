//! Expand command - runs the image expander on its own.

use anyhow::{bail, Result};
use std::path::Path;

use crate::image::expand::{expand, gib_to_bytes};
use crate::process::Host;

/// Grow `image` by `gb` GiB. Returns whether the filesystem was resized.
pub fn cmd_expand(host: &dyn Host, image: &Path, gb: u64) -> Result<bool> {
    if gb == 0 {
        bail!("Nothing to do: --gb must be at least 1");
    }
    let bytes = gib_to_bytes(gb)?;
    println!("Expanding {} by {gb}GB...", image.display());
    let result = expand(host, image, bytes);
    match &result.warning {
        None => println!(
            "Root filesystem grown; image is now {} bytes",
            result.new_size_bytes
        ),
        Some(warning) => println!("Expansion incomplete: {warning}"),
    }
    Ok(result.success)
}
