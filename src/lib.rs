//! ptux-image library exports.
//!
//! The binary is a thin CLI over [`pipeline::build_image`]; everything it
//! uses is exposed here for integration testing.

pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod template;
pub mod timing;
pub mod tools;
pub mod workspace;

pub use config::{BuildConfig, BuildParams, EnvOverrides, RunMode};
pub use error::{BuildError, ConfigError};
pub use pipeline::{build_image, BuildReport, Stage};
pub use workspace::{Interrupt, Lifecycle, RunState};
