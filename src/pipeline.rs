//! SD card image build pipeline.
//!
//! Stages, in order (any failure aborts the run):
//! 1. Bootstrap - populate the root directory from the templated config
//! 2. Archive - tarball of the root directory
//! 3. Embed - optionally copy that tarball into the root directory
//! 4. Manifest - list installed packages
//! 5. Allocate - sparse image file of the configured size
//! 6. Partition - bootable FAT partition + Linux root partition
//! 7. Format & Populate - make filesystems and copy the tree in
//!
//! Embed runs after Archive so the tarball never contains itself. The boot
//! files are copied onto the root filesystem before the boot partition is
//! mounted over `/boot`, and then again into the boot partition, so both
//! partitions are populated independently.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::{BuildError, IoContext};
use crate::geometry::Geometry;
use crate::template;
use crate::timing::Timer;
use crate::tools::{FormatOp, FormatScript, HostTools};
use crate::workspace::{BuildWorkspace, Interrupt, Lifecycle};

/// Filesystem type of the boot partition.
pub const BOOT_FS_TYPE: &str = "vfat";

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bootstrap,
    Archive,
    Embed,
    Manifest,
    Allocate,
    Partition,
    FormatPopulate,
}

impl Stage {
    pub const ORDER: [Stage; 7] = [
        Stage::Bootstrap,
        Stage::Archive,
        Stage::Embed,
        Stage::Manifest,
        Stage::Allocate,
        Stage::Partition,
        Stage::FormatPopulate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Bootstrap => "Bootstrap",
            Stage::Archive => "Archive",
            Stage::Embed => "Embed",
            Stage::Manifest => "Manifest",
            Stage::Allocate => "Allocate",
            Stage::Partition => "Partition",
            Stage::FormatPopulate => "Format & Populate",
        }
    }

    fn banner(self) -> &'static str {
        match self {
            Stage::Bootstrap => "Bootstrapping root filesystem (this may take a while)...",
            Stage::Archive => "Archiving root filesystem...",
            Stage::Embed => "Embedding archive in root filesystem...",
            Stage::Manifest => "Writing package manifest...",
            Stage::Allocate => "Allocating image...",
            Stage::Partition => "Writing partition table...",
            Stage::FormatPopulate => "Formatting and populating partitions...",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub image: PathBuf,
    pub archive: PathBuf,
    pub manifest: PathBuf,
    pub image_bytes: u64,
    pub archive_bytes: u64,
    pub package_count: usize,
    /// Stages that ran, in order.
    pub stages: Vec<Stage>,
}

impl BuildReport {
    pub fn print(&self) {
        println!("\n=== SD Card Image Built ===");
        println!("  Image:    {} ({} MB)", self.image.display(), self.image_bytes / 1024 / 1024);
        println!(
            "  Archive:  {} ({:.2} MB)",
            self.archive.display(),
            self.archive_bytes as f64 / 1024.0 / 1024.0
        );
        println!(
            "  Manifest: {} ({} packages)",
            self.manifest.display(),
            self.package_count
        );
    }
}

/// Build the image, archive and manifest described by `config`.
///
/// Either all three artifacts exist afterwards and `Ok` is returned, or none
/// of them do. The workspace is removed in both cases unless the config is in
/// sub-invocation mode.
pub fn build_image(
    config: &BuildConfig,
    tools: &HostTools<'_>,
    interrupt: &Interrupt,
) -> Result<BuildReport, BuildError> {
    println!("=== Building SD Card Image: {} ===\n", config.target_package());

    let geometry = Geometry::from_config(config)?;

    let mut lifecycle = Lifecycle::new(config);
    let workspace = lifecycle
        .allocate(config.work_dir(), config.target_package())?
        .clone();
    template::write_templated(
        config.bootstrap_template(),
        config.target_package(),
        config.distribution(),
        &workspace.config_file,
    )?;
    println!("Workspace:");
    println!("  Config: {}", workspace.config_file.display());
    println!("  Root:   {}", workspace.root_dir.display());

    lifecycle.begin_stages();
    let outcome = run_stages(config, &geometry, &workspace, tools, interrupt);
    lifecycle.finish(&outcome);

    if let Err(e) = &outcome {
        eprintln!("\n[!] Build failed: {}", e);
        println!("Removing partial artifacts...");
    }
    lifecycle.teardown();

    outcome
}

/// Runs stages one at a time and turns interruption into a stage error.
struct StageRunner<'a> {
    interrupt: &'a Interrupt,
    completed: Vec<Stage>,
}

impl StageRunner<'_> {
    fn run<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        self.check(stage)?;
        println!("\n{}", stage.banner());
        let timer = Timer::start(stage.name());

        let value = match f() {
            Ok(value) => value,
            // A tool killed by the same signal reports its own failure;
            // report the interruption instead.
            Err(_) if self.interrupt.is_raised() => return Err(interrupted(stage)),
            Err(e) => return Err(e),
        };

        self.check(stage)?;
        timer.finish();
        self.completed.push(stage);
        Ok(value)
    }

    fn check(&self, stage: Stage) -> Result<(), BuildError> {
        if self.interrupt.is_raised() {
            return Err(interrupted(stage));
        }
        Ok(())
    }
}

fn interrupted(stage: Stage) -> BuildError {
    BuildError::Interrupted {
        stage: stage.name().to_string(),
    }
}

fn run_stages(
    config: &BuildConfig,
    geometry: &Geometry,
    workspace: &BuildWorkspace,
    tools: &HostTools<'_>,
    interrupt: &Interrupt,
) -> Result<BuildReport, BuildError> {
    let root = workspace.root_dir.as_path();
    let mut runner = StageRunner {
        interrupt,
        completed: Vec::new(),
    };

    runner.run(Stage::Bootstrap, || {
        tools.bootstrapper.bootstrap(&workspace.config_file, root)
    })?;
    report_rootfs_size(root, geometry.image_bytes);

    runner.run(Stage::Archive, || {
        tools.archiver.archive(root, config.archive_path())
    })?;

    if config.embed_archive() {
        runner.run(Stage::Embed, || embed_archive(config.archive_path(), root))?;
    }

    let package_count = runner.run(Stage::Manifest, || {
        let manifest = tools.manifest.manifest(root)?;
        fs::write(config.manifest_path(), &manifest).io_context(|| {
            format!("Failed to write manifest {}", config.manifest_path().display())
        })?;
        Ok(manifest.lines().count())
    })?;

    runner.run(Stage::Allocate, || {
        allocate_image(config.output_image(), geometry.image_bytes)
    })?;

    runner.run(Stage::Partition, || {
        tools
            .partitioner
            .partition(config.output_image(), &geometry.partition_table())
    })?;

    runner.run(Stage::FormatPopulate, || {
        let script = format_script(config.rootfs_type(), root)?;
        tools.formatter.apply(config.output_image(), &script)
    })?;

    let archive_bytes = fs::metadata(config.archive_path())
        .io_context(|| format!("Failed to stat {}", config.archive_path().display()))?
        .len();

    Ok(BuildReport {
        image: config.output_image().to_path_buf(),
        archive: config.archive_path().to_path_buf(),
        manifest: config.manifest_path().to_path_buf(),
        image_bytes: geometry.image_bytes,
        archive_bytes,
        package_count,
        stages: runner.completed,
    })
}

/// Copy the archive into the root of the tree that goes into the image.
pub fn embed_archive(archive: &Path, root: &Path) -> Result<PathBuf, BuildError> {
    let name = archive.file_name().ok_or_else(|| {
        BuildError::io(
            format!("Archive path {} has no file name", archive.display()),
            std::io::ErrorKind::InvalidInput.into(),
        )
    })?;
    let dest = root.join(name);
    fs::copy(archive, &dest).io_context(|| {
        format!("Failed to copy {} to {}", archive.display(), dest.display())
    })?;
    Ok(dest)
}

/// Create a sparse image file of `bytes` bytes. Never overwrites.
pub fn allocate_image(image: &Path, bytes: u64) -> Result<(), BuildError> {
    let file = fs::File::create_new(image)
        .io_context(|| format!("Failed to create image {}", image.display()))?;
    file.set_len(bytes)
        .io_context(|| format!("Failed to size image {} to {} bytes", image.display(), bytes))?;
    Ok(())
}

/// Formatter operations that lay `root` out over the two partitions.
pub fn format_script(rootfs_type: &str, root: &Path) -> Result<FormatScript, BuildError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .io_context(|| format!("Failed to read {}", root.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .io_context(|| format!("Failed to read {}", root.display()))?;
    entries.sort();

    let mut script = FormatScript::default();
    script.push(FormatOp::Format {
        partition: 1,
        fs_type: BOOT_FS_TYPE.to_string(),
    });
    script.push(FormatOp::Format {
        partition: 2,
        fs_type: rootfs_type.to_string(),
    });
    script.push(FormatOp::Mount {
        partition: 2,
        mountpoint: "/".to_string(),
    });
    script.push(FormatOp::Mkdir("/boot".to_string()));

    let boot = root.join("boot");
    if boot.is_dir() {
        script.push(FormatOp::CopyIn {
            source: boot,
            dest: "/".to_string(),
        });
    }

    script.push(FormatOp::Mount {
        partition: 1,
        mountpoint: "/boot".to_string(),
    });
    for entry in entries {
        script.push(FormatOp::CopyIn {
            source: entry,
            dest: "/".to_string(),
        });
    }
    script.push(FormatOp::UnmountAll);

    Ok(script)
}

/// Log the bootstrapped tree size and warn if it cannot fit the image.
fn report_rootfs_size(root: &Path, image_bytes: u64) {
    let bytes: u64 = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    println!("  Root filesystem: {} MB", bytes / 1024 / 1024);
    if bytes > image_bytes {
        eprintln!(
            "[WARN] Root filesystem ({} MB) is larger than the image ({} MB)",
            bytes / 1024 / 1024,
            image_bytes / 1024 / 1024
        );
    }
}
