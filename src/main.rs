//! ptux-image - SD card image builder.
//!
//! Produces, for one target package:
//! - a raw disk image with a bootable FAT partition and a root partition
//! - a gzip tarball of the bootstrapped root filesystem
//! - a manifest of the installed packages

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use ptux_image::config::{self, BuildConfig, BuildParams, EnvOverrides, RunMode};
use ptux_image::tools::SystemTools;
use ptux_image::{build_image, preflight, BuildError, Interrupt};

#[derive(Parser)]
#[command(name = "ptux-image")]
#[command(version, about = "Build a bootable SD card image for a two-stage-boot board")]
#[command(
    after_help = "ENVIRONMENT:\n  PTUX_PACKAGE, PTUX_CONFIG, PTUX_IMAGE, PTUX_SIZE, PTUX_DIST, PTUX_FSTYPE, PTUX_WORKDIR\n  override the defaults; command line options override the environment.\n\nOUTPUT:\n  <image>, <image stem>.tgz and <image stem>.manifest. None of them may exist yet."
)]
struct Cli {
    /// Base package / device name (e.g. beagle)
    package: Option<String>,

    /// Print the bootstrap config template and exit
    #[arg(short = 'C')]
    print_config: bool,

    /// Bootstrap config template
    #[arg(short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Filesystem size in megabytes (default: 1024)
    #[arg(short = 'd', value_name = "MEGABYTES")]
    size: Option<String>,

    /// Output image (default: ptux.img)
    #[arg(short = 'n', value_name = "PATH")]
    image: Option<PathBuf>,

    /// Distribution codename (default: unstable)
    #[arg(short = 'D', value_name = "CODENAME")]
    dist: Option<String>,

    /// Root filesystem type (default: ext4)
    #[arg(short = 'f', value_name = "TYPE", hide = true)]
    fstype: Option<String>,

    /// Copy the root filesystem archive into the image
    #[arg(short = 'z')]
    embed_archive: bool,

    /// Run on behalf of another build; leave the workspace in place
    #[arg(long)]
    sub_invocation: bool,

    /// Don't check for required host tools before building
    #[arg(long)]
    skip_preflight: bool,

    /// Parent directory for the temporary workspace
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,
}

impl Cli {
    fn into_params(self) -> BuildParams {
        BuildParams {
            target_package: self.package,
            bootstrap_template: self.config,
            distribution: self.dist,
            rootfs_type: self.fstype,
            filesystem_size_mb: self.size,
            output_image: self.image,
            embed_archive: self.embed_archive,
            work_dir: self.work_dir,
            mode: if self.sub_invocation {
                RunMode::SubInvocation
            } else {
                RunMode::Standalone
            },
        }
    }
}

/// Report a usage error with the full help text and exit 2.
fn usage_error(err: &BuildError) -> ! {
    eprintln!("error: {}\n", err);
    eprintln!("{}", Cli::command().render_help());
    std::process::exit(2);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present; real environment variables win.
    dotenvy::dotenv().ok();
    let env = EnvOverrides::capture();

    let print_config = cli.print_config;
    let skip_preflight = cli.skip_preflight;
    let params = cli.into_params();

    if print_config {
        return match config::print_template(&params, &env, &mut io::stdout().lock()) {
            Err(BuildError::Config(e)) if e.is_usage() => usage_error(&BuildError::Config(e)),
            other => other.map_err(Into::into),
        };
    }

    let config = match BuildConfig::resolve(params, &env) {
        Ok(config) => config,
        Err(e) if e.is_usage() => usage_error(&e.into()),
        Err(e) => return Err(e.into()),
    };
    config.print();
    println!();

    if !skip_preflight {
        preflight::run_preflight_or_fail()?;
        println!();
    }

    let interrupt = Interrupt::new();
    interrupt
        .install()
        .context("Failed to install signal handler")?;

    let tools = SystemTools::new();
    let report = build_image(&config, &tools.as_host_tools(), &interrupt)?;
    report.print();

    Ok(())
}
