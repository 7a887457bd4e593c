//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BuildConfig` and writes the resulting PDF.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::{
    build_to_file, preflight, BuildConfig, BuildProgressCallback, BuildStep, Md2PdfError,
    ProgressCallback, Upload, UploadFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over the build steps plus a log line per step.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos}/{len}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Staging");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BuildProgressCallback for CliProgressCallback {
    fn on_build_start(&self, total_steps: usize) {
        self.bar.set_length(total_steps as u64);
        self.bar.set_prefix("Building");
    }

    fn on_step_start(&self, step: BuildStep) {
        self.bar.set_message(step.to_string());
    }

    fn on_step_complete(&self, step: BuildStep, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            step.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_step_error(&self, step: BuildStep, _error: &str) {
        self.bar.println(format!("  {} {}", red("✗"), step));
    }

    fn on_build_complete(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Build paper.pdf in the current directory
  md2pdf --markdown paper.md --bib library.bib --figures figures.zip

  # Choose output path and asset directory
  md2pdf -m paper.md -b refs.bib -f figs.zip -o build/paper.pdf --assets-dir /srv/md2pdf

  # Check the deployment (assets + pandoc/pdflatex/bibtex) without building
  md2pdf --check --assets-dir /srv/md2pdf

  # Machine-readable build statistics
  md2pdf -m paper.md -b refs.bib -f figs.zip --json

ASSETS (relative to --assets-dir):
  ieee/ieee-conference.tex   pandoc template
  ieee/IEEEtran.cls          document class
  ieee/IEEEtran.bst          bibliography style
  ieee/ieee.csl              citation style
  ieee/pandoc-csl-fix.tex    pandoc/CSL compatibility fix

ENVIRONMENT VARIABLES:
  MD2PDF_ASSETS_DIR   Directory holding the ieee/ assets
  MD2PDF_TIMEOUT      Wall-clock limit for the tool chain (seconds)
  TEXINPUTS, BIBINPUTS, BSTINPUTS
                      Extended (never replaced) for each build
  RUST_LOG            Log filter, e.g. edgequake_md2pdf=debug
"#;

/// Build an IEEE-style PDF from Markdown, BibTeX and a figure archive.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Build an IEEE-style PDF from Markdown, BibTeX and a figure archive",
    long_about = "Stage a Markdown manuscript, its BibTeX bibliography and a zip of figures \
into an isolated workspace, then run pandoc and a pdflatex/bibtex/pdflatex/pdflatex cycle \
to produce paper.pdf. The workspace is removed afterwards whatever the outcome.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown manuscript (.md).
    #[arg(short, long, required_unless_present = "check")]
    markdown: Option<PathBuf>,

    /// BibTeX bibliography (.bib).
    #[arg(short, long, required_unless_present = "check")]
    bib: Option<PathBuf>,

    /// Zip archive of figures referenced by the manuscript.
    #[arg(short, long, required_unless_present = "check")]
    figures: Option<PathBuf>,

    /// Where to write the PDF.
    #[arg(short, long, env = "MD2PDF_OUTPUT", default_value = "paper.pdf")]
    output: PathBuf,

    /// Directory containing the ieee/ template assets.
    #[arg(long, env = "MD2PDF_ASSETS_DIR", default_value = ".")]
    assets_dir: PathBuf,

    /// Parent directory for the temporary build workspace.
    #[arg(long, env = "MD2PDF_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Wall-clock limit for the tool chain, in seconds.
    #[arg(long, env = "MD2PDF_TIMEOUT", default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Maximum combined upload size in bytes.
    #[arg(long, env = "MD2PDF_MAX_UPLOAD", default_value_t = 100 * 1024 * 1024)]
    max_upload: u64,

    /// pandoc executable.
    #[arg(long, env = "MD2PDF_PANDOC", default_value = "pandoc")]
    pandoc: String,

    /// pdflatex executable.
    #[arg(long, env = "MD2PDF_PDFLATEX", default_value = "pdflatex")]
    pdflatex: String,

    /// bibtex executable.
    #[arg(long, env = "MD2PDF_BIBTEX", default_value = "bibtex")]
    bibtex: String,

    /// Check assets and tools, then exit without building.
    #[arg(long)]
    check: bool,

    /// Print build statistics as JSON on stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BuildProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Check-only mode ──────────────────────────────────────────────────
    if cli.check {
        let report = preflight(&config);
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else {
            println!("Assets:   {}", report.assets_root.display());
            for name in &config.assets {
                let ok = !report.missing_assets.contains(name);
                println!("  {} {}", if ok { green("✓") } else { red("✗") }, name);
            }
            println!("Tools:");
            for program in [&config.pandoc, &config.pdflatex, &config.bibtex] {
                let ok = !report.missing_tools.contains(program);
                println!("  {} {}", if ok { green("✓") } else { red("✗") }, program);
            }
        }
        if !report.is_ready() {
            anyhow::bail!("Deployment is incomplete");
        }
        return Ok(());
    }

    // ── Read inputs ──────────────────────────────────────────────────────
    let upload = Upload {
        markdown: read_optional(cli.markdown.as_deref())?,
        bibliography: read_optional(cli.bib.as_deref())?,
        figures: read_optional(cli.figures.as_deref())?,
    };

    // ── Run build ────────────────────────────────────────────────────────
    let stats = match build_to_file(upload, &cli.output, &config).await {
        Ok(stats) => stats,
        Err(e) => {
            report_failure(&e);
            return Err(anyhow::Error::new(e).context("Build failed"));
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} bytes  {}ms  →  {}",
            green("✔"),
            stats.pdf_bytes,
            stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `BuildConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BuildConfig> {
    let mut builder = BuildConfig::builder()
        .assets_root(&cli.assets_dir)
        .timeout_secs(cli.timeout)
        .max_upload_bytes(cli.max_upload)
        .pandoc(&cli.pandoc)
        .pdflatex(&cli.pdflatex)
        .bibtex(&cli.bibtex);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_root(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Read an input file if the flag was given; absent flags stay `None` so
/// validation reports the specific missing file.
fn read_optional(path: Option<&Path>) -> Result<Option<UploadFile>> {
    path.map(|p| {
        UploadFile::from_path(p).with_context(|| format!("Failed to read {}", p.display()))
    })
    .transpose()
}

/// Print the captured tool log for tool failures.
fn report_failure(e: &Md2PdfError) {
    if let Some(log) = e.diagnostic_log() {
        if !log.is_empty() {
            eprintln!("{}", bold("── tool output ──"));
            eprintln!("{log}");
            eprintln!("{}", bold("─────────────────"));
        }
    }
}
