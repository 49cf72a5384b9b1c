//! Build command - customizes a copy of the base image.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::finalize::{self, BuildRecord, ExpansionRecord};
use crate::image::expand::{expand, gib_to_bytes};
use crate::image::MountedImage;
use crate::pipeline::{render_summary, Pipeline, PipelineOutcome, RowStatus, Step, StepContext, SummaryRow};
use crate::preflight;
use crate::process::Host;
use crate::timing::Timer;

/// Options for `lemon-pi build`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Base image to start from.
    pub image: Option<PathBuf>,
    /// Where the customized copy goes.
    pub output: Option<PathBuf>,
    pub skip_expand: bool,
    /// Overrides `EXPAND_GB`.
    pub expand_gb: Option<u64>,
}

/// How a build ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Succeeded { image: PathBuf },
    Failed { image: PathBuf },
    Interrupted { image: PathBuf },
}

impl BuildStatus {
    pub fn image(&self) -> &Path {
        match self {
            Self::Succeeded { image } | Self::Failed { image } | Self::Interrupted { image } => {
                image
            }
        }
    }
}

/// Execute the build command: preflight, then [`run_build`].
pub fn cmd_build(
    host: &dyn Host,
    config: &Config,
    opts: &BuildOptions,
    steps: &[Step],
    cancel: Arc<AtomicBool>,
) -> Result<BuildStatus> {
    let output = output_path(config, opts)?;
    let work_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    preflight::run_preflight_or_fail(host, config, work_dir)?;
    run_build(host, config, opts, steps, cancel)
}

/// The build itself, without the host readiness checks.
pub fn run_build(
    host: &dyn Host,
    config: &Config,
    opts: &BuildOptions,
    steps: &[Step],
    cancel: Arc<AtomicBool>,
) -> Result<BuildStatus> {
    let base = base_image(config, opts)?;
    let output = output_path(config, opts)?;
    if output == base {
        bail!(
            "Output {} would overwrite the base image; pass a different -o",
            output.display()
        );
    }

    let expand_gb = opts.expand_gb.unwrap_or(config.expand_gb);
    let expand_bytes = if opts.skip_expand {
        0
    } else {
        gib_to_bytes(expand_gb)?
    };

    println!("=== lemon-pi build ===\n");
    println!("Copying {} -> {}", base.display(), output.display());
    fs::copy(&base, &output).with_context(|| {
        format!("Failed to copy {} to {}", base.display(), output.display())
    })?;
    tracing::info!(image = %output.display(), "working copy created");

    let expansion = if opts.skip_expand || expand_gb == 0 {
        println!("Skipping image expansion");
        None
    } else {
        println!("\nExpanding image by {expand_gb}GB...");
        let timer = Timer::start();
        let result = expand(host, &output, expand_bytes);
        Some(ExpansionRecord {
            result,
            elapsed: timer.elapsed(),
        })
    };

    if cancel.load(Ordering::SeqCst) {
        println!("\nInterrupted before customization started");
        return Ok(BuildStatus::Interrupted { image: output });
    }

    let mounted = MountedImage::open(host, &output, config.mount_layout(), false)
        .with_context(|| format!("Failed to mount {}", output.display()))?;
    println!(
        "\nMounted {} at {} and {}",
        output.display(),
        mounted.boot().display(),
        mounted.root().display()
    );

    let outcome = {
        let ctx = StepContext::for_image(&mounted, config);
        Pipeline::new(Arc::clone(&cancel)).run(steps, &ctx)
    };
    let released = mounted.release();

    println!("\n{}", render_summary(&summary_rows(expansion.as_ref(), &outcome)));

    let mut image = output;
    if let Err(e) = released {
        // The image is still attached: leave the file where it is.
        write_record(&image, config, expansion.as_ref(), &outcome);
        return Err(anyhow::Error::new(e).context(format!(
            "{} is still mounted; run `lemon-pi unmount {}`",
            image.display(),
            image.display()
        )));
    }

    if outcome.success {
        if let Some(version) = outcome.metadata("version") {
            image = finalize::rename_with_version(&image, config, version)?;
        }
        let checksum = finalize::write_checksum(&image)?;
        println!("Checksum: {}", checksum.display());
    }
    write_record(&image, config, expansion.as_ref(), &outcome);

    Ok(if outcome.interrupted {
        BuildStatus::Interrupted { image }
    } else if outcome.success {
        println!("\nBuild complete: {}", image.display());
        BuildStatus::Succeeded { image }
    } else {
        if let Some(step) = outcome.failed_step() {
            println!("\nBuild failed at step '{}'", step.name);
        }
        BuildStatus::Failed { image }
    })
}

fn base_image(config: &Config, opts: &BuildOptions) -> Result<PathBuf> {
    match &opts.image {
        Some(path) if path.is_file() => Ok(path.clone()),
        Some(path) => bail!(
            "Base image {} not found. Download and decompress BASE_IMAGE_URL first:\n  {}",
            path.display(),
            config.base_image_url
        ),
        None => bail!(
            "No base image given. Download and decompress BASE_IMAGE_URL, then pass the .img:\n  {}",
            config.base_image_url
        ),
    }
}

fn output_path(config: &Config, opts: &BuildOptions) -> Result<PathBuf> {
    if let Some(output) = &opts.output {
        return Ok(output.clone());
    }
    let name = format!("{}-{}.img", config.output_prefix, config.image_version);
    let dir = std::env::current_dir().context("Failed to resolve current directory")?;
    Ok(dir.join(name))
}

fn summary_rows(expansion: Option<&ExpansionRecord>, outcome: &PipelineOutcome) -> Vec<SummaryRow> {
    let mut rows = Vec::with_capacity(outcome.results.len() + 1);
    if let Some(record) = expansion {
        let status = if record.result.success {
            RowStatus::Success
        } else {
            RowStatus::Warning
        };
        rows.push(SummaryRow::new("Expand image", status, record.elapsed));
    }
    rows.extend(outcome.summary_rows());
    rows
}

fn write_record(
    image: &Path,
    config: &Config,
    expansion: Option<&ExpansionRecord>,
    outcome: &PipelineOutcome,
) {
    let record = BuildRecord::new(image, config, expansion, outcome);
    match finalize::write_build_record(image, &record) {
        Ok(path) => println!("Build record: {}", path.display()),
        Err(e) => tracing::warn!("could not write build record: {e:#}"),
    }
}
