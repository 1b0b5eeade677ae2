//! Build parameter resolution.
//!
//! Merges three layers into one [`BuildConfig`], highest precedence first:
//! explicit parameters (command line), environment overrides, built-in
//! defaults. The environment is read once into an [`EnvOverrides`] snapshot;
//! nothing downstream looks at the process environment again.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, ConfigError, IoContext};
use crate::geometry::BOOT_PARTITION_SIZE;

pub const DEFAULT_DISTRIBUTION: &str = "unstable";
pub const DEFAULT_ROOTFS_TYPE: &str = "ext4";
pub const DEFAULT_FILESYSTEM_SIZE_MB: u64 = 1024;
pub const DEFAULT_OUTPUT_IMAGE: &str = "ptux.img";

pub const ENV_ROOTFS_TYPE: &str = "PTUX_FSTYPE";
pub const ENV_PACKAGE: &str = "PTUX_PACKAGE";
pub const ENV_IMAGE: &str = "PTUX_IMAGE";
pub const ENV_TEMPLATE: &str = "PTUX_CONFIG";
pub const ENV_SIZE: &str = "PTUX_SIZE";
pub const ENV_DISTRIBUTION: &str = "PTUX_DIST";
pub const ENV_WORK_DIR: &str = "PTUX_WORKDIR";

const ENV_KEYS: [&str; 7] = [
    ENV_ROOTFS_TYPE,
    ENV_PACKAGE,
    ENV_IMAGE,
    ENV_TEMPLATE,
    ENV_SIZE,
    ENV_DISTRIBUTION,
    ENV_WORK_DIR,
];

/// Whether this run owns its workspace or hands it back to a calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Workspace is removed at teardown.
    #[default]
    Standalone,
    /// Invoked by another orchestrating run; the workspace is left in place.
    SubInvocation,
}

/// Explicitly supplied build parameters. `None` falls through to the
/// environment, then to the default.
#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    pub target_package: Option<String>,
    pub bootstrap_template: Option<PathBuf>,
    pub distribution: Option<String>,
    pub rootfs_type: Option<String>,
    /// Raw size string as given; parsed during resolution.
    pub filesystem_size_mb: Option<String>,
    pub output_image: Option<PathBuf>,
    pub embed_archive: bool,
    pub work_dir: Option<PathBuf>,
    pub mode: RunMode,
}

/// Snapshot of the environment variables the resolver cares about.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build a snapshot from explicit pairs. Unknown keys and empty values
    /// are dropped.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| {
                let value: String = v.into();
                (k.into(), value.trim().to_string())
            })
            .filter(|(k, v)| ENV_KEYS.contains(&k.as_str()) && !v.is_empty())
            .collect();
        Self { vars }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Fully resolved, validated build configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    target_package: String,
    bootstrap_template: PathBuf,
    distribution: String,
    rootfs_type: String,
    filesystem_size_mb: u64,
    boot_partition_size: u64,
    output_image: PathBuf,
    archive_path: PathBuf,
    manifest_path: PathBuf,
    embed_archive: bool,
    work_dir: PathBuf,
    mode: RunMode,
}

impl BuildConfig {
    /// Resolve and validate a configuration. Performs no writes.
    pub fn resolve(params: BuildParams, env: &EnvOverrides) -> Result<Self, ConfigError> {
        let target_package = params
            .target_package
            .filter(|p| !p.trim().is_empty())
            .or_else(|| env.get(ENV_PACKAGE).map(str::to_string))
            .ok_or(ConfigError::MissingPackage)?;

        let bootstrap_template = resolve_template(params.bootstrap_template, env)?;
        check_template_readable(&bootstrap_template)?;

        let distribution = params
            .distribution
            .or_else(|| env.get(ENV_DISTRIBUTION).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_DISTRIBUTION.to_string());

        let rootfs_type = params
            .rootfs_type
            .or_else(|| env.get(ENV_ROOTFS_TYPE).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ROOTFS_TYPE.to_string());

        let filesystem_size_mb = match params
            .filesystem_size_mb
            .or_else(|| env.get(ENV_SIZE).map(str::to_string))
        {
            Some(raw) => parse_size(&raw)?,
            None => DEFAULT_FILESYSTEM_SIZE_MB,
        };

        let output_image = params
            .output_image
            .or_else(|| env.get(ENV_IMAGE).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_IMAGE));

        let work_dir = params
            .work_dir
            .or_else(|| env.get(ENV_WORK_DIR).map(PathBuf::from))
            .unwrap_or_else(std::env::temp_dir);

        let (archive_path, manifest_path) = derive_artifact_paths(&output_image)?;

        if output_image.exists() {
            return Err(ConfigError::ImageExists(output_image));
        }
        if archive_path.exists() {
            return Err(ConfigError::ArchiveExists(archive_path));
        }
        if manifest_path.exists() {
            return Err(ConfigError::ManifestExists(manifest_path));
        }

        Ok(Self {
            target_package,
            bootstrap_template,
            distribution,
            rootfs_type,
            filesystem_size_mb,
            boot_partition_size: BOOT_PARTITION_SIZE,
            output_image,
            archive_path,
            manifest_path,
            embed_archive: params.embed_archive,
            work_dir,
            mode: params.mode,
        })
    }

    pub fn target_package(&self) -> &str {
        &self.target_package
    }

    pub fn bootstrap_template(&self) -> &Path {
        &self.bootstrap_template
    }

    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    pub fn rootfs_type(&self) -> &str {
        &self.rootfs_type
    }

    pub fn filesystem_size_mb(&self) -> u64 {
        self.filesystem_size_mb
    }

    pub fn boot_partition_size(&self) -> u64 {
        self.boot_partition_size
    }

    pub fn output_image(&self) -> &Path {
        &self.output_image
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// The three deliverables, image first.
    pub fn artifacts(&self) -> [&Path; 3] {
        [&self.output_image, &self.archive_path, &self.manifest_path]
    }

    pub fn embed_archive(&self) -> bool {
        self.embed_archive
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Print configuration for the build log.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Package:        {}", self.target_package);
        println!("  Template:       {}", self.bootstrap_template.display());
        println!("  Distribution:   {}", self.distribution);
        println!("  Root FS type:   {}", self.rootfs_type);
        println!("  Image size:     {} MB", self.filesystem_size_mb);
        println!("  Boot partition: {}", self.boot_partition_size);
        println!("  Image:          {}", self.output_image.display());
        println!("  Archive:        {}", self.archive_path.display());
        println!("  Manifest:       {}", self.manifest_path.display());
        println!(
            "  Embed archive:  {}",
            if self.embed_archive { "yes" } else { "no" }
        );
        if self.mode == RunMode::SubInvocation {
            println!("  Workspace:      kept for caller");
        }
    }
}

/// Print-config mode: copy the raw template bytes to `out`.
///
/// Only the template path is resolved. No other parameter is validated and
/// nothing is written to disk.
pub fn print_template<W: Write>(
    params: &BuildParams,
    env: &EnvOverrides,
    out: &mut W,
) -> Result<(), BuildError> {
    let template = resolve_template(params.bootstrap_template.clone(), env)?;
    let content = fs::read(&template).map_err(|source| ConfigError::UnreadableTemplate {
        path: template.clone(),
        source,
    })?;
    out.write_all(&content)
        .io_context(|| "Failed to write template to stdout")?;
    out.flush().io_context(|| "Failed to flush stdout")?;
    Ok(())
}

fn resolve_template(explicit: Option<PathBuf>, env: &EnvOverrides) -> Result<PathBuf, ConfigError> {
    explicit
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env.get(ENV_TEMPLATE).map(PathBuf::from))
        .ok_or(ConfigError::MissingTemplate)
}

/// The template must be a regular file we can open. Opening a directory
/// succeeds on Linux, so the file type is checked first.
fn check_template_readable(path: &Path) -> Result<(), ConfigError> {
    let unreadable = |source| ConfigError::UnreadableTemplate {
        path: path.to_path_buf(),
        source,
    };
    let meta = fs::metadata(path).map_err(unreadable)?;
    if !meta.is_file() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    fs::File::open(path).map_err(unreadable)?;
    Ok(())
}

fn parse_size(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidSize(raw.to_string())),
        Ok(mb) => Ok(mb),
    }
}

/// `foo/ptux.img` -> (`foo/ptux.tgz`, `foo/ptux.manifest`).
fn derive_artifact_paths(image: &Path) -> Result<(PathBuf, PathBuf), ConfigError> {
    if image.file_stem().is_none() {
        return Err(ConfigError::BadImagePath(image.to_path_buf()));
    }
    let archive = image.with_extension("tgz");
    let manifest = image.with_extension("manifest");
    if image == archive || image == manifest {
        return Err(ConfigError::ImageClashesWithArtifact(image.to_path_buf()));
    }
    Ok((archive, manifest))
}
