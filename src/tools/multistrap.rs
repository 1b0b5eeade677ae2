//! multistrap bootstrapper.

use std::path::Path;

use super::Bootstrapper;
use crate::error::BuildError;
use crate::process::Cmd;

/// Runs `multistrap -f <config> -d <dir>`.
pub struct Multistrap;

impl Multistrap {
    fn command(config_file: &Path, root_dir: &Path) -> Cmd {
        Cmd::new("multistrap")
            .arg("-f")
            .arg_path(config_file)
            .arg("-d")
            .arg_path(root_dir)
    }
}

impl Bootstrapper for Multistrap {
    fn bootstrap(&self, config_file: &Path, root_dir: &Path) -> Result<(), BuildError> {
        let cmd = Self::command(config_file, root_dir);
        println!("  Running: {}", cmd.display());
        cmd.run()?;
        Ok(())
    }
}
