//! MBR partition table via sfdisk.

use std::fmt::Write as _;
use std::path::Path;

use super::Partitioner;
use crate::error::BuildError;
use crate::geometry::{PartitionSize, PartitionSpec};
use crate::process::Cmd;

/// Pipes a `label: dos` script into `sfdisk <image>`.
///
/// Fixed sizes are written as bare numbers, which sfdisk reads as sectors.
pub struct Sfdisk;

/// Render the sfdisk input script for `table`.
pub fn render_script(table: &[PartitionSpec]) -> String {
    let mut script = String::from("label: dos\n");
    for spec in table {
        let mut fields = Vec::new();
        if let PartitionSize::Fixed(size) = spec.size {
            fields.push(format!("size={}", size));
        }
        fields.push(format!("type={:x}", spec.type_code));
        if spec.bootable {
            fields.push("bootable".to_string());
        }
        let _ = writeln!(script, "{}", fields.join(", "));
    }
    script
}

impl Partitioner for Sfdisk {
    fn partition(&self, image: &Path, table: &[PartitionSpec]) -> Result<(), BuildError> {
        Cmd::new("sfdisk")
            .arg("--no-reread")
            .arg("--no-tell-kernel")
            .arg_path(image)
            .stdin(render_script(table))
            .run()?;
        Ok(())
    }
}
