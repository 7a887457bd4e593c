//! The build tool chain: a linear, fail-fast step machine.
//!
//! ```text
//! Convert ─▶ FixCitations ─▶ Clean ─▶ StageBibliography
//!    ─▶ Compile1 ─▶ Bibtex ─▶ Compile2 ─▶ Compile3 ─▶ done
//! ```
//!
//! Each step runs only if the previous one succeeded; the first failure ends
//! the build and is returned as-is. Nothing is retried. External tools run
//! in the workspace root with the [`ToolEnv`] search paths and their output
//! captured; on a non-zero exit the captured stdout/stderr becomes the
//! diagnostic log of [`Md2PdfError::ToolFailure`].
//!
//! Two compiles after bibtex is the classic LaTeX recipe. Documents whose
//! page layout shifts once citations resolve may need a fourth pass; the
//! recipe is kept at three.
//!
//! The whole chain runs under [`BuildConfig::timeout_secs`]. Children are
//! spawned with `kill_on_drop`, so when the deadline drops the in-flight
//! future the running tool is killed with it.

use crate::config::{BuildConfig, TEMPLATE_ASSET};
use crate::error::Md2PdfError;
use crate::output::StepTiming;
use crate::pipeline::env::ToolEnv;
use crate::pipeline::postprocess;
use crate::pipeline::workspace::{Workspace, JOB_NAME, OUTPUT_DIR};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One state of the build machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// pandoc: `paperFiles/paper.md` → `outputs/paper.tex`.
    Convert,
    /// `\citep` → `\cite` in the generated `.tex`.
    FixCitations,
    /// Remove byproducts of an earlier run.
    Clean,
    /// Copy `*.bib` next to the `.tex`.
    StageBibliography,
    /// pdflatex, first pass.
    Compile1,
    /// bibtex on `outputs/paper`.
    Bibtex,
    /// pdflatex, second pass.
    Compile2,
    /// pdflatex, third pass.
    Compile3,
}

impl BuildStep {
    /// Every step, in execution order.
    pub const ALL: [BuildStep; 8] = [
        BuildStep::Convert,
        BuildStep::FixCitations,
        BuildStep::Clean,
        BuildStep::StageBibliography,
        BuildStep::Compile1,
        BuildStep::Bibtex,
        BuildStep::Compile2,
        BuildStep::Compile3,
    ];

    /// The step that follows this one, or `None` after the last.
    pub fn next(self) -> Option<BuildStep> {
        match self {
            BuildStep::Convert => Some(BuildStep::FixCitations),
            BuildStep::FixCitations => Some(BuildStep::Clean),
            BuildStep::Clean => Some(BuildStep::StageBibliography),
            BuildStep::StageBibliography => Some(BuildStep::Compile1),
            BuildStep::Compile1 => Some(BuildStep::Bibtex),
            BuildStep::Bibtex => Some(BuildStep::Compile2),
            BuildStep::Compile2 => Some(BuildStep::Compile3),
            BuildStep::Compile3 => None,
        }
    }

    /// `true` for steps that spawn an external program.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            BuildStep::Convert
                | BuildStep::Compile1
                | BuildStep::Bibtex
                | BuildStep::Compile2
                | BuildStep::Compile3
        )
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildStep::Convert => "Markdown conversion",
            BuildStep::FixCitations => "Citation fix",
            BuildStep::Clean => "Byproduct cleanup",
            BuildStep::StageBibliography => "Bibliography staging",
            BuildStep::Compile1 => "LaTeX pass 1",
            BuildStep::Bibtex => "Bibliography resolution",
            BuildStep::Compile2 => "LaTeX pass 2",
            BuildStep::Compile3 => "LaTeX pass 3",
        };
        f.write_str(label)
    }
}

/// A program plus arguments, resolved for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

/// The external command for `step`, or `None` for in-process steps.
///
/// Paths are relative to the workspace root except the manuscript, which
/// is absolute.
pub fn invocation(step: BuildStep, ws: &Workspace, config: &BuildConfig) -> Option<Invocation> {
    let out = Path::new(OUTPUT_DIR);
    let tex = out.join(format!("{JOB_NAME}.tex"));
    match step {
        BuildStep::Convert => Some(Invocation {
            program: config.pandoc.clone(),
            args: vec![
                ws.manuscript_path().into(),
                "--template".into(),
                PathBuf::from(TEMPLATE_ASSET).into(),
                "--natbib".into(),
                "-s".into(),
                "-o".into(),
                tex.into(),
            ],
        }),
        BuildStep::Compile1 | BuildStep::Compile2 | BuildStep::Compile3 => Some(Invocation {
            program: config.pdflatex.clone(),
            args: vec![
                "-interaction=nonstopmode".into(),
                "-halt-on-error".into(),
                "-output-directory".into(),
                out.into(),
                tex.into(),
            ],
        }),
        BuildStep::Bibtex => Some(Invocation {
            program: config.bibtex.clone(),
            args: vec![out.join(JOB_NAME).into()],
        }),
        BuildStep::FixCitations | BuildStep::Clean | BuildStep::StageBibliography => None,
    }
}

/// Run the full step sequence in `ws`, bounded by `config.timeout_secs`.
///
/// Emits `on_build_start`; `on_build_complete` is left to the caller, which
/// only knows the outcome once the artifact has been read.
pub async fn run(ws: &Workspace, config: &BuildConfig) -> Result<Vec<StepTiming>, Md2PdfError> {
    let env = ToolEnv::for_workspace(ws);
    let limit = Duration::from_secs(config.timeout_secs);

    if let Some(ref cb) = config.progress_callback {
        cb.on_build_start(BuildStep::ALL.len());
    }

    match tokio::time::timeout(limit, run_steps(ws, config, &env)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Build exceeded {}s; tool chain terminated", config.timeout_secs);
            Err(Md2PdfError::Timeout {
                secs: config.timeout_secs,
            })
        }
    }
}

async fn run_steps(
    ws: &Workspace,
    config: &BuildConfig,
    env: &ToolEnv,
) -> Result<Vec<StepTiming>, Md2PdfError> {
    let mut timings = Vec::with_capacity(BuildStep::ALL.len());
    let mut state = Some(BuildStep::Convert);

    while let Some(step) = state {
        if let Some(ref cb) = config.progress_callback {
            cb.on_step_start(step);
        }
        let start = Instant::now();

        if let Err(e) = run_step(step, ws, config, env).await {
            warn!("{} failed: {}", step, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_step_error(step, &e.to_string());
            }
            return Err(e);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("{} done in {}ms", step, duration_ms);
        if let Some(ref cb) = config.progress_callback {
            cb.on_step_complete(step, duration_ms);
        }
        timings.push(StepTiming { step, duration_ms });
        state = step.next();
    }

    Ok(timings)
}

async fn run_step(
    step: BuildStep,
    ws: &Workspace,
    config: &BuildConfig,
    env: &ToolEnv,
) -> Result<(), Md2PdfError> {
    if let Some(inv) = invocation(step, ws, config) {
        return execute(step, &inv, ws.root(), env).await;
    }
    match step {
        BuildStep::FixCitations => {
            postprocess::fix_citations(&ws.output_file("tex")).await?;
        }
        BuildStep::Clean => {
            postprocess::remove_stale_byproducts(&ws.output_dir(), JOB_NAME).await?;
        }
        BuildStep::StageBibliography => {
            postprocess::stage_bibliographies(&ws.paper_dir(), &ws.output_dir()).await?;
        }
        other => {
            return Err(Md2PdfError::Internal(format!(
                "{other} has no invocation"
            )))
        }
    }
    Ok(())
}

/// Spawn `inv` in `cwd` and wait for it. Non-zero exit → `ToolFailure`.
pub async fn execute(
    step: BuildStep,
    inv: &Invocation,
    cwd: &Path,
    env: &ToolEnv,
) -> Result<(), Md2PdfError> {
    debug!("{}: {} {:?}", step, inv.program, inv.args);

    let output = Command::new(&inv.program)
        .args(&inv.args)
        .current_dir(cwd)
        .envs(env.vars())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Md2PdfError::ToolNotFound {
            program: inv.program.clone(),
            reason: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(());
    }

    Err(Md2PdfError::ToolFailure {
        step,
        program: inv.program.clone(),
        code: output.status.code(),
        log: combine_output(&output.stdout, &output.stderr),
    })
}

/// stdout, then stderr on its own line if present, trimmed.
pub fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut log = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        log.push('\n');
        log.push_str(&String::from_utf8_lossy(stderr));
    }
    log.trim().to_string()
}
