//! Shared test utilities for ptux-image tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use ptux_image::geometry::PartitionSpec;
use ptux_image::tools::{
    Archiver, Bootstrapper, FormatScript, Formatter, HostTools, ManifestGenerator, Partitioner,
};
use ptux_image::{BuildConfig, BuildError, BuildParams, EnvOverrides, Interrupt, Stage};
use tempfile::TempDir;

pub const TEMPLATE: &str = "[General]\n\
    bootstrap=Debian\n\
    \n\
    [Debian]\n\
    packages=@PACKAGE@-base\n\
    suite=@DIST@\n";

pub const MANIFEST: &str = "base-files 13\nbeagle-base 1.0\nlibc6 2.40\n";

/// Test environment: a scratch directory holding the template, the outputs
/// and the workspace parent.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base: PathBuf,
    pub template: PathBuf,
    pub work_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let template = base.join("multistrap.conf");
        let work_dir = base.join("work");

        fs::write(&template, TEMPLATE).expect("Failed to write template");
        fs::create_dir(&work_dir).expect("Failed to create work dir");

        Self {
            _temp_dir: temp_dir,
            base,
            template,
            work_dir,
        }
    }

    /// Parameters for a `beagle` build writing `ptux.img` into the scratch dir.
    pub fn params(&self) -> BuildParams {
        BuildParams {
            target_package: Some("beagle".into()),
            bootstrap_template: Some(self.template.clone()),
            output_image: Some(self.base.join("ptux.img")),
            work_dir: Some(self.work_dir.clone()),
            ..Default::default()
        }
    }

    pub fn config(&self) -> BuildConfig {
        self.config_with(self.params())
    }

    pub fn config_with(&self, params: BuildParams) -> BuildConfig {
        BuildConfig::resolve(params, &EnvOverrides::default()).expect("config should resolve")
    }

    pub fn image(&self) -> PathBuf {
        self.base.join("ptux.img")
    }

    pub fn archive(&self) -> PathBuf {
        self.base.join("ptux.tgz")
    }

    pub fn manifest(&self) -> PathBuf {
        self.base.join("ptux.manifest")
    }

    /// Entries left in the workspace parent.
    pub fn workspace_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.work_dir)
            .expect("Failed to read work dir")
            .map(|e| e.expect("Failed to read entry").path())
            .collect();
        entries.sort();
        entries
    }
}

/// What the fake tools should do wrong, if anything.
#[derive(Default)]
pub enum Fault {
    #[default]
    None,
    /// The stage's tool exits non-zero.
    FailAt(Stage),
    /// A signal arrives while the stage's tool is running.
    InterruptAt(Stage, Interrupt),
    /// The archiver reports success without writing anything.
    NoArchiveWritten,
}

/// In-process stand-ins for every collaborator. They do just enough on disk
/// for the following stages to work and record what they were asked to do.
#[derive(Default)]
pub struct FakeTools {
    pub fault: Fault,
    /// Stage names in the order they were invoked.
    pub calls: RefCell<Vec<&'static str>>,
    pub bootstrap_config: RefCell<Option<String>>,
    pub archived_entries: RefCell<Vec<String>>,
    pub partition_table: RefCell<Vec<PartitionSpec>>,
    pub format_script: RefCell<Option<FormatScript>>,
    pub image_len_at_partition: RefCell<Option<u64>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(fault: Fault) -> Self {
        Self {
            fault,
            ..Default::default()
        }
    }

    pub fn host_tools(&self) -> HostTools<'_> {
        HostTools {
            bootstrapper: self,
            archiver: self,
            manifest: self,
            partitioner: self,
            formatter: self,
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn enter(&self, stage: Stage, tool: &str) -> Result<(), BuildError> {
        self.calls.borrow_mut().push(stage.name());
        match &self.fault {
            Fault::FailAt(s) if *s == stage => {
                Err(BuildError::tool(tool, Some(1), format!("{} exploded", tool)))
            }
            Fault::InterruptAt(s, interrupt) if *s == stage => {
                interrupt.raise();
                Err(BuildError::tool(tool, None, "terminated by signal"))
            }
            _ => Ok(()),
        }
    }
}

impl Bootstrapper for FakeTools {
    fn bootstrap(&self, config_file: &Path, root_dir: &Path) -> Result<(), BuildError> {
        *self.bootstrap_config.borrow_mut() = fs::read_to_string(config_file).ok();
        // Half-populate before failing, like a real bootstrap would.
        fs::create_dir_all(root_dir.join("etc")).expect("mkdir etc");
        self.enter(Stage::Bootstrap, "multistrap")?;
        fs::create_dir_all(root_dir.join("boot")).expect("mkdir boot");
        fs::create_dir_all(root_dir.join("var/lib/dpkg")).expect("mkdir dpkg");
        fs::write(root_dir.join("boot/MLO"), "mlo").expect("write MLO");
        fs::write(root_dir.join("etc/hostname"), "beagle\n").expect("write hostname");
        Ok(())
    }
}

impl Archiver for FakeTools {
    fn archive(&self, source_dir: &Path, archive: &Path) -> Result<(), BuildError> {
        if matches!(self.fault, Fault::NoArchiveWritten) {
            self.calls.borrow_mut().push(Stage::Archive.name());
            return Ok(());
        }
        // Leave a partial archive behind on failure.
        fs::write(archive, "partial").expect("write archive");
        self.enter(Stage::Archive, "tar")?;
        let mut entries: Vec<String> = walk(source_dir)
            .iter()
            .map(|p| p.strip_prefix(source_dir).unwrap().display().to_string())
            .collect();
        entries.sort();
        fs::write(archive, entries.join("\n")).expect("write archive");
        *self.archived_entries.borrow_mut() = entries;
        Ok(())
    }
}

impl ManifestGenerator for FakeTools {
    fn manifest(&self, _root_dir: &Path) -> Result<String, BuildError> {
        self.enter(Stage::Manifest, "dpkg-query")?;
        Ok(MANIFEST.to_string())
    }
}

impl Partitioner for FakeTools {
    fn partition(&self, image: &Path, table: &[PartitionSpec]) -> Result<(), BuildError> {
        *self.image_len_at_partition.borrow_mut() = fs::metadata(image).ok().map(|m| m.len());
        self.enter(Stage::Partition, "sfdisk")?;
        *self.partition_table.borrow_mut() = table.to_vec();
        Ok(())
    }
}

impl Formatter for FakeTools {
    fn apply(&self, _image: &Path, script: &FormatScript) -> Result<(), BuildError> {
        self.enter(Stage::FormatPopulate, "guestfish")?;
        *self.format_script.borrow_mut() = Some(script.clone());
        Ok(())
    }
}

/// All files under `dir`, recursively.
fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).expect("read_dir") {
        let path = entry.expect("entry").path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a file does not exist.
pub fn assert_file_absent(path: &Path) {
    assert!(
        !path.exists(),
        "Expected file to be removed: {}",
        path.display()
    );
}
