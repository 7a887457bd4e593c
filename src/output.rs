//! Result types returned by the build entry points.

use crate::pipeline::runner::BuildStep;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Download filename of the compiled artifact.
pub const ARTIFACT_FILE_NAME: &str = "paper.pdf";

/// Content type of the compiled artifact.
pub const ARTIFACT_CONTENT_TYPE: &str = "application/pdf";

/// A successfully compiled document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    /// The full PDF, read into memory before the workspace was destroyed.
    #[serde(skip)]
    pub pdf: Vec<u8>,

    /// Fixed download filename ([`ARTIFACT_FILE_NAME`]).
    pub file_name: String,

    /// Fixed content type ([`ARTIFACT_CONTENT_TYPE`]).
    pub content_type: String,

    pub stats: BuildStats,
}

impl BuildOutput {
    pub(crate) fn new(pdf: Vec<u8>, stats: BuildStats) -> Self {
        Self {
            pdf,
            file_name: ARTIFACT_FILE_NAME.to_string(),
            content_type: ARTIFACT_CONTENT_TYPE.to_string(),
            stats,
        }
    }
}

/// Wall-clock time spent in one pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: BuildStep,
    pub duration_ms: u64,
}

/// Counters and timings for one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    /// Files and directories extracted from the figure archive.
    pub extracted_entries: usize,
    /// Staged links created at the workspace root.
    pub staged_links: usize,
    /// Per-step timings, in execution order.
    pub steps: Vec<StepTiming>,
    /// Size of the returned PDF in bytes.
    pub pdf_bytes: u64,
    pub staging_duration_ms: u64,
    pub pipeline_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Deployment health check: what a build would be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Resolved asset root.
    pub assets_root: PathBuf,
    /// Asset paths (relative) absent from the asset root.
    pub missing_assets: Vec<String>,
    /// Tool programs that could not be located.
    pub missing_tools: Vec<String>,
}

impl PreflightReport {
    /// `true` when every asset and tool was found.
    pub fn is_ready(&self) -> bool {
        self.missing_assets.is_empty() && self.missing_tools.is_empty()
    }
}
