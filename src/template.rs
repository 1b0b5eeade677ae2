//! Bootstrap config templating.
//!
//! The template is a multistrap-style config with two placeholders that get
//! replaced literally, everywhere they appear.

use std::fs;
use std::path::Path;

use crate::error::{BuildError, IoContext};

/// Replaced with the target package / device name.
pub const PACKAGE_TOKEN: &str = "@PACKAGE@";

/// Replaced with the distribution codename.
pub const DIST_TOKEN: &str = "@DIST@";

/// Substitute both placeholders in `template`.
///
/// Each token is replaced in a single left-to-right pass over the original
/// text, so a substituted value that happens to contain the other token is
/// left alone.
pub fn render(template: &str, package: &str, dist: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let next_pkg = rest.find(PACKAGE_TOKEN);
        let next_dist = rest.find(DIST_TOKEN);
        let (at, token, value) = match (next_pkg, next_dist) {
            (Some(p), Some(d)) if d < p => (d, DIST_TOKEN, dist),
            (Some(p), _) => (p, PACKAGE_TOKEN, package),
            (None, Some(d)) => (d, DIST_TOKEN, dist),
            (None, None) => break,
        };
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + token.len()..];
    }

    out.push_str(rest);
    out
}

/// Render `template_path` into `dest`.
pub fn write_templated(
    template_path: &Path,
    package: &str,
    dist: &str,
    dest: &Path,
) -> Result<(), BuildError> {
    let template = fs::read_to_string(template_path)
        .io_context(|| format!("Failed to read template {}", template_path.display()))?;
    fs::write(dest, render(&template, package, dist))
        .io_context(|| format!("Failed to write config {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_tokens_replaced() {
        let template = "[General]\nsuite=@DIST@\npackages=@PACKAGE@-base\n";
        assert_eq!(
            render(template, "beagle", "unstable"),
            "[General]\nsuite=unstable\npackages=beagle-base\n"
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        assert_eq!(
            render("@PACKAGE@ @PACKAGE@ @DIST@@DIST@", "a", "b"),
            "a a bb"
        );
    }

    #[test]
    fn test_values_are_literal() {
        assert_eq!(render("x=@PACKAGE@", "a.*$1\\", "d"), "x=a.*$1\\");
    }

    #[test]
    fn test_substituted_values_not_rescanned() {
        assert_eq!(render("@PACKAGE@/@DIST@", "@DIST@", "sid"), "@DIST@/sid");
    }

    #[test]
    fn test_no_tokens_unchanged() {
        let template = "[General]\nnoauth=true\n@PACK@\n";
        assert_eq!(render(template, "beagle", "sid"), template);
    }

    #[test]
    fn test_write_templated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("in.conf");
        let dest = tmp.path().join("out.conf");
        fs::write(&src, "suite=@DIST@\n").unwrap();

        write_templated(&src, "beagle", "sid", &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "suite=sid\n");
    }

    #[test]
    fn test_write_templated_missing_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = write_templated(
            &tmp.path().join("missing"),
            "beagle",
            "sid",
            &tmp.path().join("out"),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
