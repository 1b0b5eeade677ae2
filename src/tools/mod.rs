//! Collaborator interfaces for the external tools the build drives.
//!
//! The pipeline only talks to these traits. Each has one adapter that shells
//! out to a real tool:
//! - `multistrap` - root filesystem bootstrap
//! - `tar` - gzip tarball of the root filesystem
//! - `dpkg_query` - installed-package manifest
//! - `sfdisk` - MBR partition table
//! - `guestfish` - format partitions and copy files in, without root

mod dpkg_query;
mod guestfish;
mod multistrap;
mod sfdisk;
mod tar;

pub use dpkg_query::DpkgQuery;
pub use guestfish::Guestfish;
pub use multistrap::Multistrap;
pub use sfdisk::Sfdisk;
pub use tar::TarGz;

use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::geometry::PartitionSpec;

/// Materializes a root filesystem tree from a bootstrap config.
pub trait Bootstrapper {
    fn bootstrap(&self, config_file: &Path, root_dir: &Path) -> Result<(), BuildError>;
}

/// Packs a directory tree into a compressed archive.
pub trait Archiver {
    fn archive(&self, source_dir: &Path, archive: &Path) -> Result<(), BuildError>;
}

/// Lists the packages installed in a root filesystem.
pub trait ManifestGenerator {
    fn manifest(&self, root_dir: &Path) -> Result<String, BuildError>;
}

/// Writes a partition table onto a disk image.
pub trait Partitioner {
    fn partition(&self, image: &Path, table: &[PartitionSpec]) -> Result<(), BuildError>;
}

/// Runs a script of format/mount/copy operations against a disk image.
pub trait Formatter {
    fn apply(&self, image: &Path, script: &FormatScript) -> Result<(), BuildError>;
}

/// One operation of a [`FormatScript`]. Partitions are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOp {
    Format { partition: u32, fs_type: String },
    Mount { partition: u32, mountpoint: String },
    Mkdir(String),
    /// Copy a host file or directory (itself, not its contents) into `dest`.
    CopyIn { source: PathBuf, dest: String },
    UnmountAll,
}

/// Ordered formatter operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatScript {
    pub ops: Vec<FormatOp>,
}

impl FormatScript {
    pub fn push(&mut self, op: FormatOp) {
        self.ops.push(op);
    }
}

/// The full set of collaborators for one build.
pub struct HostTools<'a> {
    pub bootstrapper: &'a dyn Bootstrapper,
    pub archiver: &'a dyn Archiver,
    pub manifest: &'a dyn ManifestGenerator,
    pub partitioner: &'a dyn Partitioner,
    pub formatter: &'a dyn Formatter,
}

/// The real tool adapters.
pub struct SystemTools {
    pub multistrap: Multistrap,
    pub tar: TarGz,
    pub dpkg_query: DpkgQuery,
    pub sfdisk: Sfdisk,
    pub guestfish: Guestfish,
}

impl SystemTools {
    pub fn new() -> Self {
        Self {
            multistrap: Multistrap,
            tar: TarGz,
            dpkg_query: DpkgQuery,
            sfdisk: Sfdisk,
            guestfish: Guestfish,
        }
    }

    pub fn as_host_tools(&self) -> HostTools<'_> {
        HostTools {
            bootstrapper: &self.multistrap,
            archiver: &self.tar,
            manifest: &self.dpkg_query,
            partitioner: &self.sfdisk,
            formatter: &self.guestfish,
        }
    }
}

impl Default for SystemTools {
    fn default() -> Self {
        Self::new()
    }
}

/// Program names the system adapters need on PATH.
pub const REQUIRED_PROGRAMS: [(&str, &str, &str); 5] = [
    ("multistrap", "multistrap", "Required to bootstrap the root filesystem"),
    ("tar", "tar", "Required to archive the root filesystem"),
    ("dpkg-query", "dpkg", "Required to write the package manifest"),
    ("sfdisk", "fdisk", "Required to partition the image"),
    ("guestfish", "libguestfs-tools", "Required to format and populate partitions"),
];
