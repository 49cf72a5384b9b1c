//! Output finalization: versioned file name, build record and checksum.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::image::ExpandResult;
use crate::pipeline::{as_secs, PipelineOutcome};

/// Expansion as it happened during the build.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionRecord {
    #[serde(flatten)]
    pub result: ExpandResult,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

/// Everything written to `<image>.build.json`.
#[derive(Debug, Serialize)]
pub struct BuildRecord<'a> {
    pub image: String,
    pub image_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<&'a ExpansionRecord>,
    #[serde(flatten)]
    pub pipeline: &'a PipelineOutcome,
    #[serde(rename = "total_elapsed_secs", serialize_with = "as_secs")]
    pub total_elapsed: Duration,
}

impl<'a> BuildRecord<'a> {
    pub fn new(
        image: &Path,
        config: &'a Config,
        expansion: Option<&'a ExpansionRecord>,
        pipeline: &'a PipelineOutcome,
    ) -> Self {
        let total_elapsed =
            pipeline.total_elapsed() + expansion.map(|e| e.elapsed).unwrap_or_default();
        Self {
            image: image.display().to_string(),
            image_version: &config.image_version,
            app_version: pipeline.metadata("version"),
            expansion,
            pipeline,
            total_elapsed,
        }
    }
}

/// `{OUTPUT_PREFIX}-{IMAGE_VERSION}-v{version}.img`
pub fn versioned_name(config: &Config, app_version: &str) -> String {
    format!(
        "{}-{}-v{}.img",
        config.output_prefix, config.image_version, app_version
    )
}

/// Rename `image` to its versioned name in the same directory.
pub fn rename_with_version(image: &Path, config: &Config, app_version: &str) -> Result<PathBuf> {
    let target = image.with_file_name(versioned_name(config, app_version));
    if target == image {
        return Ok(target);
    }
    fs::rename(image, &target).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            image.display(),
            target.display()
        )
    })?;
    println!("Renamed output to {}", target.display());
    Ok(target)
}

fn sidecar(image: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = image.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write the build record next to the image as `<image>.build.json`.
pub fn write_build_record(image: &Path, record: &BuildRecord<'_>) -> Result<PathBuf> {
    let path = sidecar(image, ".build.json");
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `<image>.sha256` in `sha256sum` format.
pub fn write_checksum(image: &Path) -> Result<PathBuf> {
    let hash = sha256_file(image)?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = sidecar(image, ".sha256");
    fs::write(&path, format!("{hash}  {file_name}\n"))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
