//! Package manifest from the bootstrapped root's dpkg database.

use std::path::Path;

use super::ManifestGenerator;
use crate::error::BuildError;
use crate::process::Cmd;

/// One `<package> <version>` line per installed package.
const MANIFEST_FORMAT: &str = "${Package} ${Version}\n";

/// Queries `<root>/var/lib/dpkg` with `dpkg-query -W`.
pub struct DpkgQuery;

impl DpkgQuery {
    fn command(root_dir: &Path) -> Cmd {
        let admindir = root_dir.join("var/lib/dpkg");
        Cmd::new("dpkg-query")
            .arg(format!("--admindir={}", admindir.display()))
            .arg("-W")
            .arg("-f")
            .arg(MANIFEST_FORMAT)
    }
}

impl ManifestGenerator for DpkgQuery {
    fn manifest(&self, root_dir: &Path) -> Result<String, BuildError> {
        let result = Self::command(root_dir).run()?;
        Ok(sort_lines(&result.stdout))
    }
}

/// dpkg-query lists in database order; sort so manifests diff cleanly.
fn sort_lines(listing: &str) -> String {
    let mut lines: Vec<&str> = listing.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.sort_unstable();
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
