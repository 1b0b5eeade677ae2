//! Root filesystem tarball.

use std::path::Path;

use super::Archiver;
use crate::error::BuildError;
use crate::process::Cmd;

/// Gzip tarball via `tar -czf`, rooted at the source directory.
pub struct TarGz;

impl TarGz {
    fn command(source_dir: &Path, archive: &Path) -> Cmd {
        Cmd::new("tar")
            .arg("-czf")
            .arg_path(archive)
            .arg("-C")
            .arg_path(source_dir)
            .arg(".")
    }
}

impl Archiver for TarGz {
    fn archive(&self, source_dir: &Path, archive: &Path) -> Result<(), BuildError> {
        Self::command(source_dir, archive).run()?;
        Ok(())
    }
}
