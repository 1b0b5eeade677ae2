//! Partition formatting and population via guestfish (libguestfs).

use std::fmt::Write as _;
use std::path::Path;

use super::{FormatOp, FormatScript, Formatter};
use crate::error::BuildError;
use crate::process::Cmd;

/// Feeds a rendered script to `guestfish --format=raw -a <image>`.
pub struct Guestfish;

fn device(partition: u32) -> String {
    format!("/dev/sda{}", partition)
}

/// Quote an argument for the guestfish parser when it needs it.
fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || "\"'\\#".contains(c)) {
        return arg.to_string();
    }
    let mut out = String::from("\"");
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render `script` as guestfish commands, preceded by `run`.
pub fn render_script(script: &FormatScript) -> String {
    let mut out = String::from("run\n");
    for op in &script.ops {
        let _ = match op {
            FormatOp::Format { partition, fs_type } => {
                writeln!(out, "mkfs {} {}", quote(fs_type), device(*partition))
            }
            FormatOp::Mount {
                partition,
                mountpoint,
            } => writeln!(out, "mount {} {}", device(*partition), quote(mountpoint)),
            FormatOp::Mkdir(path) => writeln!(out, "mkdir-p {}", quote(path)),
            FormatOp::CopyIn { source, dest } => writeln!(
                out,
                "copy-in {} {}",
                quote(&source.to_string_lossy()),
                quote(dest)
            ),
            FormatOp::UnmountAll => writeln!(out, "umount-all"),
        };
    }
    out
}

impl Formatter for Guestfish {
    fn apply(&self, image: &Path, script: &FormatScript) -> Result<(), BuildError> {
        Cmd::new("guestfish")
            .arg("--format=raw")
            .arg("-a")
            .arg_path(image)
            .stdin(render_script(script))
            .run()?;
        Ok(())
    }
}
