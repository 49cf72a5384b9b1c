//! Lemon Pi - Raspberry Pi appliance image builder.
//!
//! Turns a stock Raspberry Pi OS Lite image into a headless appliance:
//! - grows the root filesystem
//! - creates the user, hostname, SSH and locale setup
//! - installs and enables the application service

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use lemon_pi::commands::{self, BuildOptions, BuildStatus};
use lemon_pi::config::Config;
use lemon_pi::interrupt;
use lemon_pi::process::SystemHost;
use lemon_pi::steps::default_steps;

#[derive(Parser)]
#[command(name = "lemon-pi")]
#[command(about = "Raspberry Pi appliance image builder")]
#[command(
    after_help = "QUICK START:\n  lemon-pi preflight           Check the host\n  sudo lemon-pi build base.img  Build the image\n  lemon-pi validate out.img     Inspect the result"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a customized image from a base image
    Build {
        /// Decompressed Raspberry Pi OS image
        image: Option<PathBuf>,

        /// Output image (default: {OUTPUT_PREFIX}-{IMAGE_VERSION}.img)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Don't grow the image before customizing
        #[arg(long)]
        skip_expand: bool,

        /// Extra space in GB (overrides EXPAND_GB)
        #[arg(long)]
        expand_gb: Option<u64>,
    },

    /// Attach and mount an image, leaving it mounted
    Mount {
        image: PathBuf,
        /// Mount read-only
        #[arg(long)]
        readonly: bool,
    },

    /// Unmount and detach an image mounted with `mount`
    Unmount { image: PathBuf },

    /// Grow an image's root partition and filesystem
    Expand {
        image: PathBuf,
        /// Extra space in GB (default: EXPAND_GB)
        #[arg(long)]
        gb: Option<u64>,
    },

    /// Check a built image (read-only)
    Validate { image: PathBuf },

    /// Run preflight checks (verify the host before a build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// List the customization steps
    Steps,

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(interrupt::exit_code(false, interrupt::requested()))
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir)?;
    let host = SystemHost;

    // Before any command can attach or mount: without a handler, Ctrl-C
    // kills the process and the release guards never run.
    interrupt::install()?;

    let ok = match cli.command {
        Commands::Build {
            image,
            output,
            skip_expand,
            expand_gb,
        } => {
            let opts = BuildOptions {
                image,
                output,
                skip_expand,
                expand_gb,
            };
            let status =
                commands::cmd_build(&host, &config, &opts, &default_steps(), interrupt::flag())?;
            matches!(status, BuildStatus::Succeeded { .. })
        }

        Commands::Mount { image, readonly } => {
            commands::cmd_mount(&host, &image, &config, readonly)?;
            true
        }

        Commands::Unmount { image } => {
            commands::cmd_unmount(&host, &image, &config)?;
            true
        }

        Commands::Expand { image, gb } => {
            let gb = gb.unwrap_or(config.expand_gb);
            commands::cmd_expand(&host, &image, gb)?
        }

        Commands::Validate { image } => commands::cmd_validate(&host, &image, &config)?,

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&host, &config, &base_dir, strict)?;
            true
        }

        Commands::Steps => {
            commands::cmd_steps();
            true
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
            };
            commands::cmd_show(show_target, &config);
            true
        }
    };

    Ok(ExitCode::from(interrupt::exit_code(ok, interrupt::requested())))
}
