//! Progress-callback trait for per-step build events.
//!
//! Inject an [`Arc<dyn BuildProgressCallback>`] via
//! [`crate::config::BuildConfigBuilder::progress_callback`] to receive events
//! as the pipeline runs each external tool.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{BuildConfig, BuildProgressCallback, BuildStep};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BuildProgressCallback for Printer {
//!     fn on_step_complete(&self, step: BuildStep, elapsed_ms: u64) {
//!         eprintln!("{step} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = BuildConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn BuildProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::runner::BuildStep;
use std::sync::Arc;

/// Called by the pipeline runner as it moves through the build steps.
///
/// Implementations must be `Send + Sync`: several builds may share one
/// config. All methods have no-op defaults.
pub trait BuildProgressCallback: Send + Sync {
    /// Called once the workspace is staged, before the first tool runs.
    fn on_build_start(&self, total_steps: usize) {
        let _ = total_steps;
    }

    /// Called just before a step begins.
    fn on_step_start(&self, step: BuildStep) {
        let _ = step;
    }

    /// Called when a step finishes successfully.
    fn on_step_complete(&self, step: BuildStep, elapsed_ms: u64) {
        let _ = (step, elapsed_ms);
    }

    /// Called when a step fails; the build stops after this.
    fn on_step_error(&self, step: BuildStep, error: &str) {
        let _ = (step, error);
    }

    /// Called once after the tool chain has finished or failed. Success
    /// means the PDF was also read back; a build whose tools all pass but
    /// write no PDF reports `false`.
    fn on_build_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation. This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BuildProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BuildConfig`].
pub type ProgressCallback = Arc<dyn BuildProgressCallback>;
