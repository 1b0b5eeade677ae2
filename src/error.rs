//! Error taxonomy for image builds.
//!
//! Library code returns [`BuildError`]; the binary wraps it in `anyhow` for
//! reporting. Every variant is fatal to the current run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Bad or missing build parameters. Raised before any side effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no target package given (pass PACKAGE or set PTUX_PACKAGE)")]
    MissingPackage,

    #[error("no bootstrap config template given (pass -c or set PTUX_CONFIG)")]
    MissingTemplate,

    #[error("cannot read bootstrap config template {path}: {source}")]
    UnreadableTemplate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid filesystem size '{0}' (expected a positive number of megabytes)")]
    InvalidSize(String),

    #[error("output image {0} has no file name to derive artifact names from")]
    BadImagePath(PathBuf),

    #[error("output image {0} would share its path with the archive or manifest")]
    ImageClashesWithArtifact(PathBuf),

    #[error("output image {0} already exists, refusing to overwrite")]
    ImageExists(PathBuf),

    #[error("archive {0} already exists, refusing to overwrite")]
    ArchiveExists(PathBuf),

    #[error("manifest {0} already exists, refusing to overwrite")]
    ManifestExists(PathBuf),
}

impl ConfigError {
    /// Missing required parameters are usage errors and get the usage text.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::MissingPackage | Self::MissingTemplate)
    }
}

/// Failure of a build run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{}", describe_tool_failure(.tool, .code, .stderr))]
    ExternalTool {
        tool: String,
        /// Exit code, `None` if the tool could not be started or was killed.
        code: Option<i32>,
        stderr: String,
    },

    #[error("interrupted during {stage}")]
    Interrupted { stage: String },
}

impl BuildError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn tool(tool: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            code,
            stderr: stderr.into(),
        }
    }
}

fn describe_tool_failure(tool: &str, code: &Option<i32>, stderr: &str) -> String {
    let head = match code {
        Some(code) => format!("'{}' failed (exit code {})", tool, code),
        None => format!("'{}' failed", tool),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        head
    } else {
        format!("{}:\n{}", head, stderr)
    }
}

/// Attach a context message to an `io::Result`.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T, BuildError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T, BuildError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| BuildError::io(f(), e))
    }
}
