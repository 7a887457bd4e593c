//! # edgequake-md2pdf
//!
//! Build IEEE-conference PDFs from a Markdown manuscript, a BibTeX
//! bibliography, and a zip archive of figures.
//!
//! The crate drives external tools (pandoc, pdflatex, bibtex) and owns
//! everything around them: safe staging of untrusted uploads, per-build
//! search paths, the multi-pass compile, and cleanup on every exit path.
//!
//! ## Pipeline Overview
//!
//! ```text
//! paper.md + refs.bib + figures.zip
//!  │
//!  ├─ 1. Validate  presence, extensions, size; sanitise the .bib name
//!  ├─ 2. Stage     temp workspace, trusted assets, safe zip extraction
//!  ├─ 3. Link      paperFiles/ siblings linked into the workspace root
//!  ├─ 4. Build     pandoc → \citep fix → clean → .bib staging
//!  │               → pdflatex → bibtex → pdflatex → pdflatex
//!  └─ 5. Output    paper.pdf in memory; workspace removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{build, BuildConfig, Upload, UploadFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BuildConfig::builder().assets_root("/srv/md2pdf").build()?;
//!     let upload = Upload::new(
//!         UploadFile::from_path("paper.md")?,
//!         UploadFile::from_path("library.bib")?,
//!         UploadFile::from_path("figures.zip")?,
//!     );
//!     let output = build(upload, &config).await?;
//!     std::fs::write(&output.file_name, &output.pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Deployment
//!
//! The asset root must contain the five files of
//! [`config::DEFAULT_ASSETS`] (IEEE template, class, styles, and the
//! pandoc/CSL fix). `pandoc`, `pdflatex`, and `bibtex` must be runnable.
//! [`preflight`] checks both.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BuildConfig, BuildConfigBuilder};
pub use convert::{build, build_sync, build_to_file, preflight};
pub use error::{Md2PdfError, ValidationError};
pub use output::{BuildOutput, BuildStats, PreflightReport, StepTiming};
pub use pipeline::runner::BuildStep;
pub use pipeline::upload::{Upload, UploadFile};
pub use progress::{BuildProgressCallback, NoopProgressCallback, ProgressCallback};
