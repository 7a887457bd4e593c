//! Error types for the edgequake-md2pdf library.
//!
//! Two error types reflect two audiences:
//!
//! * [`ValidationError`] — the upload itself is unusable (missing file, wrong
//!   extension, too large). Its `Display` text is the exact message shown to
//!   the person who submitted the files, and no workspace is ever created.
//!
//! * [`Md2PdfError`] — every fatal error of a build, from a malicious archive
//!   to a LaTeX run that exits non-zero. `ToolFailure` carries the captured
//!   tool output; read it with [`Md2PdfError::diagnostic_log`].
//!
//! No error is retried: a document build is deterministic, so re-running it
//! on the same input fails the same way.

use crate::pipeline::runner::BuildStep;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md2pdf library.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload triple failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An archive entry would land outside the extraction directory.
    #[error("Zip file contains an unsafe path: '{entry}'")]
    PathTraversal { entry: String },

    /// The figure archive could not be read as a zip file.
    #[error("Figures upload is not a valid zip archive: {detail}")]
    InvalidArchive { detail: String },

    /// The archive declares more uncompressed data than allowed.
    #[error("Figures archive expands to {actual} bytes (limit {limit} bytes)")]
    ArchiveTooLarge { limit: u64, actual: u64 },

    // ── Deployment errors ─────────────────────────────────────────────────
    /// A trusted template/style asset is absent from the assets root.
    #[error("Missing required asset: {name}\nCheck --assets-dir (MD2PDF_ASSETS_DIR).")]
    MissingAsset { name: String },

    /// A collaborator program could not be started at all.
    #[error("Could not run '{program}': {reason}\nIs it installed and on PATH?")]
    ToolNotFound { program: String, reason: String },

    // ── Build errors ──────────────────────────────────────────────────────
    /// A collaborator exited with a non-zero status.
    #[error("{step} failed: '{program}' returned non-zero exit status {}", fmt_code(.code))]
    ToolFailure {
        step: BuildStep,
        program: String,
        code: Option<i32>,
        log: String,
    },

    /// The tool chain exceeded the configured wall-clock bound.
    #[error("Build timed out after {secs}s; the running tool was terminated")]
    Timeout { secs: u64 },

    /// Every tool succeeded but no PDF was written.
    #[error("PDF was not generated: '{path}' is missing")]
    ArtifactMissing { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A file-system operation on the workspace or an output file failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// Wrap an I/O error with a short description of what was being done.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Md2PdfError::Io {
            context: context.into(),
            source,
        }
    }

    /// Captured stdout/stderr of the failing tool, if this is a tool failure.
    pub fn diagnostic_log(&self) -> Option<&str> {
        match self {
            Md2PdfError::ToolFailure { log, .. } => Some(log.as_str()),
            _ => None,
        }
    }

    /// `true` for errors caused by what the user uploaded.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Md2PdfError::Validation(_)
                | Md2PdfError::PathTraversal { .. }
                | Md2PdfError::InvalidArchive { .. }
                | Md2PdfError::ArchiveTooLarge { .. }
        )
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "(killed by signal)".to_string(),
    }
}

/// Upload validation failures. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing .md file.")]
    MissingMarkdown,

    #[error("Missing .bib file.")]
    MissingBibliography,

    #[error("Missing figures .zip file.")]
    MissingFigures,

    #[error("Markdown file must be .md.")]
    MarkdownExtension,

    #[error("Bibliography file must be .bib.")]
    BibliographyExtension,

    #[error("Figures upload must be a .zip.")]
    FiguresExtension,

    #[error("Upload is {actual} bytes; the limit is {limit} bytes.")]
    TooLarge { limit: u64, actual: u64 },
}
