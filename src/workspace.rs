//! Run-scoped temporary resources and transactional cleanup.
//!
//! A [`Lifecycle`] owns the workspace (templated config file + root
//! directory) and knows which output artifacts belong to the run. Its
//! `teardown` removes the workspace on every exit path, and the outputs on
//! every exit path except success. `Drop` runs `teardown`, so an early return
//! or an unwinding panic cleans up too.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{BuildConfig, RunMode};
use crate::error::{BuildError, IoContext};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    WorkspaceAllocated,
    StagesRunning,
    Succeeded,
    Failed,
    Interrupted,
    TornDown,
}

/// Set by SIGINT/SIGTERM/SIGHUP. Checked by the pipeline between stages.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide signal handler that raises this flag.
    ///
    /// The handler replaces default termination, so the process keeps
    /// running until the pipeline notices the flag and tears down. Can only
    /// be installed once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let flag = Arc::clone(&self.0);
        ctrlc::set_handler(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                eprintln!("\n[WARN] Interrupted, cleaning up after the current step...");
            }
        })
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Disposable per-run files.
#[derive(Debug, Clone)]
pub struct BuildWorkspace {
    /// Substituted bootstrap config.
    pub config_file: PathBuf,
    /// Bootstrapped root filesystem tree.
    pub root_dir: PathBuf,
}

impl BuildWorkspace {
    /// Create both resources under `parent` with random, package-tagged names.
    ///
    /// If the second one cannot be created the first is removed again, so a
    /// failure here never leaves anything behind.
    pub fn create(parent: &Path, package: &str) -> Result<Self, BuildError> {
        let prefix = format!("ptux-{}-", sanitize(package));

        let config_file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".conf")
            .tempfile_in(parent)
            .io_context(|| format!("Failed to create config file in {}", parent.display()))?;
        let (_, config_file) = config_file
            .keep()
            .map_err(|e| BuildError::io("Failed to keep config file", e.error))?;

        let root_dir = match tempfile::Builder::new().prefix(&prefix).tempdir_in(parent) {
            Ok(dir) => dir.keep(),
            Err(e) => {
                let _ = fs::remove_file(&config_file);
                return Err(BuildError::io(
                    format!("Failed to create root directory in {}", parent.display()),
                    e,
                ));
            }
        };

        Ok(Self {
            config_file,
            root_dir,
        })
    }

    /// Remove both resources. Missing ones are not an error.
    pub fn remove(&self) -> io::Result<()> {
        remove_if_exists(&self.config_file, false)?;
        remove_if_exists(&self.root_dir, true)?;
        Ok(())
    }
}

/// Keep package names from escaping the workspace parent.
fn sanitize(package: &str) -> String {
    package
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
        .collect()
}

fn remove_if_exists(path: &Path, dir: bool) -> io::Result<()> {
    let res = if dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match res {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// State machine for one build run.
#[derive(Debug)]
pub struct Lifecycle {
    state: RunState,
    mode: RunMode,
    workspace: Option<BuildWorkspace>,
    outputs: Vec<PathBuf>,
}

impl Lifecycle {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            state: RunState::Idle,
            mode: config.mode(),
            workspace: None,
            outputs: config.artifacts().iter().map(|p| p.to_path_buf()).collect(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// `Idle -> WorkspaceAllocated`.
    pub fn allocate(&mut self, parent: &Path, package: &str) -> Result<&BuildWorkspace, BuildError> {
        debug_assert_eq!(self.state, RunState::Idle);
        let workspace = BuildWorkspace::create(parent, package)?;
        self.state = RunState::WorkspaceAllocated;
        Ok(self.workspace.insert(workspace))
    }

    /// `WorkspaceAllocated -> StagesRunning`.
    pub fn begin_stages(&mut self) {
        debug_assert_eq!(self.state, RunState::WorkspaceAllocated);
        self.state = RunState::StagesRunning;
    }

    /// `StagesRunning -> {Succeeded, Failed, Interrupted}`.
    pub fn finish<T>(&mut self, outcome: &Result<T, BuildError>) {
        self.state = match outcome {
            Ok(_) => RunState::Succeeded,
            Err(BuildError::Interrupted { .. }) => RunState::Interrupted,
            Err(_) => RunState::Failed,
        };
    }

    /// Release everything the run owns. Safe to call more than once.
    ///
    /// Outputs are kept only after `Succeeded`. A teardown reached while
    /// still `StagesRunning` (unwinding) counts as a failure.
    pub fn teardown(&mut self) {
        if self.state == RunState::TornDown {
            return;
        }

        if let Some(workspace) = self.workspace.take() {
            match self.mode {
                RunMode::Standalone => {
                    if let Err(e) = workspace.remove() {
                        eprintln!("[WARN] Failed to remove workspace: {}", e);
                    }
                }
                RunMode::SubInvocation => {
                    println!("  Keeping workspace for caller:");
                    println!("    Config: {}", workspace.config_file.display());
                    println!("    Root:   {}", workspace.root_dir.display());
                }
            }
        }

        let keep_outputs = matches!(
            self.state,
            RunState::Succeeded | RunState::Idle | RunState::WorkspaceAllocated
        );
        if !keep_outputs {
            for output in &self.outputs {
                match remove_if_exists(output, false) {
                    Ok(()) => {}
                    Err(e) => eprintln!("[WARN] Failed to remove {}: {}", output.display(), e),
                }
            }
        }

        self.state = RunState::TornDown;
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}
