//! Build entry points.
//!
//! [`build`] is the whole request lifecycle: validate the upload, stage a
//! fresh workspace, run the tool chain with staged links in place, read the
//! PDF, and remove the workspace. Every resource is owned by a guard
//! ([`Workspace`], [`StagedLinks`]), so each `?` below is also a cleanup path.

use crate::config::BuildConfig;
use crate::error::Md2PdfError;
use crate::output::{BuildOutput, BuildStats, PreflightReport};
use crate::pipeline::links::StagedLinks;
use crate::pipeline::upload::Upload;
use crate::pipeline::workspace::{self, Workspace};
use crate::pipeline::{artifact, runner};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Build a PDF from a manuscript, bibliography, and figure archive.
///
/// # Errors
/// - [`Md2PdfError::Validation`] — missing file or wrong extension; no
///   workspace is created
/// - [`Md2PdfError::PathTraversal`] — an archive entry escapes the
///   manuscript directory
/// - [`Md2PdfError::MissingAsset`] — the assets root is incomplete
/// - [`Md2PdfError::ToolFailure`] — a tool exited non-zero; see
///   [`Md2PdfError::diagnostic_log`]
/// - [`Md2PdfError::Timeout`] — the tool chain exceeded `timeout_secs`
/// - [`Md2PdfError::ArtifactMissing`] — tools succeeded but wrote no PDF
///
/// The workspace no longer exists when this function returns, whatever the
/// outcome.
pub async fn build(upload: Upload, config: &BuildConfig) -> Result<BuildOutput, Md2PdfError> {
    let total_start = Instant::now();

    // ── Step 1: Validate ─────────────────────────────────────────────────
    let validated = upload.validate(config.max_upload_bytes)?;

    // ── Step 2: Stage workspace ──────────────────────────────────────────
    let staging_start = Instant::now();
    let stage_config = config.clone();
    let (ws, extract) =
        tokio::task::spawn_blocking(move || workspace::stage(&validated, &stage_config))
            .await
            .map_err(|e| Md2PdfError::Internal(format!("Staging task panicked: {e}")))??;
    let staging_duration_ms = staging_start.elapsed().as_millis() as u64;
    info!(
        "Staged {} in {}ms",
        ws.root().display(),
        staging_duration_ms
    );

    // ── Step 3: Run the tool chain with staged links ─────────────────────
    let pipeline_start = Instant::now();
    let links = StagedLinks::create(&ws.paper_dir(), ws.root())?;
    let staged_links = links.len();
    let run_result = runner::run(&ws, config).await;
    drop(links);
    let pipeline_duration_ms = pipeline_start.elapsed().as_millis() as u64;

    // ── Step 4: Read artifact, then remove the workspace ─────────────────
    let outcome = match run_result {
        Ok(steps) => artifact::read_artifact(&ws).await.map(|pdf| (steps, pdf)),
        Err(e) => Err(e),
    };
    if let Some(ref cb) = config.progress_callback {
        cb.on_build_complete(outcome.is_ok());
    }
    let (steps, pdf) = outcome?;
    release(ws);

    let stats = BuildStats {
        extracted_entries: extract.entries,
        staged_links,
        steps,
        pdf_bytes: pdf.len() as u64,
        staging_duration_ms,
        pipeline_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Build complete: {} bytes in {}ms",
        stats.pdf_bytes, stats.total_duration_ms
    );

    Ok(BuildOutput::new(pdf, stats))
}

/// Explicit removal on the success path; failure to remove is logged, not
/// returned, since the PDF is already in memory.
fn release(ws: Workspace) {
    let root = ws.root().to_path_buf();
    if let Err(e) = ws.close() {
        warn!("Workspace {} not fully removed: {}", root.display(), e);
    }
}

/// Build and write the PDF to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn build_to_file(
    upload: Upload,
    output_path: impl AsRef<Path>,
    config: &BuildConfig,
) -> Result<BuildStats, Md2PdfError> {
    let output = build(upload, config).await?;
    let path = output_path.as_ref();
    let write_err = |e| Md2PdfError::io(format!("Writing {}", path.display()), e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`build`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_sync(upload: Upload, config: &BuildConfig) -> Result<BuildOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build(upload, config))
}

/// Check that every asset exists and every tool program can be found,
/// without building anything.
pub fn preflight(config: &BuildConfig) -> PreflightReport {
    let missing_assets = config
        .assets
        .iter()
        .filter(|name| !config.assets_root.join(name).is_file())
        .cloned()
        .collect();

    let missing_tools = [&config.pandoc, &config.pdflatex, &config.bibtex]
        .into_iter()
        .filter(|program| find_program(program).is_none())
        .cloned()
        .collect();

    let report = PreflightReport {
        assets_root: config
            .assets_root
            .canonicalize()
            .unwrap_or_else(|_| config.assets_root.clone()),
        missing_assets,
        missing_tools,
    };
    debug!("Preflight: {:?}", report);
    report
}

/// Locate `program` the way a process spawn would: as a path if it has a
/// separator, otherwise by searching `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
