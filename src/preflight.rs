//! Host tool checks, run before anything is allocated.

use crate::error::BuildError;
use crate::tools::REQUIRED_PROGRAMS;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

impl CheckResult {
    pub fn pass(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            details: details.to_string(),
        }
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            details: details.to_string(),
        }
    }
}

/// Check every tool the system adapters invoke.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_PROGRAMS
        .iter()
        .map(|(tool, package, purpose)| check_tool(tool, package, purpose))
        .collect()
}

fn check_tool(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match which::which(tool) {
        Ok(path) => CheckResult::pass(tool, &path.display().to_string()),
        Err(_) => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}

/// Print `checks` and fail if any did not pass.
pub fn report(checks: &[CheckResult]) -> Result<(), BuildError> {
    for check in checks {
        let mark = if check.passed { "OK" } else { "FAIL" };
        println!("  [{}] {}: {}", mark, check.name, check.details);
    }

    let missing: Vec<&str> = checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BuildError::tool(
            missing.join(", "),
            None,
            format!("{} required host tool(s) not found on PATH", missing.len()),
        ))
    }
}

/// Check host tools and fail before the build starts if any are missing.
pub fn run_preflight_or_fail() -> Result<(), BuildError> {
    println!("Checking host tools...");
    report(&check_host_tools())
}
