//! End-to-end integration tests for edgequake-md2pdf.
//!
//! Most tests swap pandoc, pdflatex and bibtex for small shell scripts that
//! check the staged workspace and write a stand-in PDF, so the full build
//! lifecycle runs without a TeX installation.
//!
//! `test_real_toolchain` drives the genuine tools. It is gated behind the
//! `E2E_ENABLED` environment variable and needs `MD2PDF_ASSETS_DIR` to point
//! at a directory holding the `ieee/` assets.
//!
//! Run with:
//!   E2E_ENABLED=1 MD2PDF_ASSETS_DIR=/srv/md2pdf cargo test --test e2e -- --nocapture

#![cfg(unix)]

use edgequake_md2pdf::config::DEFAULT_ASSETS;
use edgequake_md2pdf::convert::find_program;
use edgequake_md2pdf::{
    build, build_sync, build_to_file, preflight, BuildConfig, BuildProgressCallback, BuildStep,
    Md2PdfError, Upload, UploadFile, ValidationError,
};
use std::io::{Cursor, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Fake tools ───────────────────────────────────────────────────────────────

const FAKE_PANDOC: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
[ -n "$out" ] || { echo "no output path" >&2; exit 2; }
printf '\\documentclass{IEEEtran}\n\\begin{document}\nSee \\citep{Test2024}.\n\\end{document}\n' > "$out"
"#;

/// Checks the citation fix, the staged bibliography, the root link to the
/// figures, and the search path before writing a stand-in PDF.
const FAKE_PDFLATEX: &str = r#"#!/bin/sh
grep -q '\\cite{Test2024}' outputs/paper.tex || { echo "citation not rewritten"; exit 3; }
grep -q 'citep' outputs/paper.tex && { echo "natbib citation left behind"; exit 3; }
[ -f outputs/library.bib ] || { echo "outputs/library.bib missing"; exit 3; }
[ -e result_plots/plot.png ] || { echo "figure link missing"; exit 3; }
case "$TEXINPUTS" in
  */ieee:*) ;;
  *) echo "TEXINPUTS not extended: $TEXINPUTS"; exit 3 ;;
esac
echo "This is pdfTeX (fake)"
echo '\relax' > outputs/paper.aux
printf '%%PDF-1.5\n%%%%EOF\n' > outputs/paper.pdf
"#;

const FAKE_BIBTEX: &str = r#"#!/bin/sh
[ -f "$1.aux" ] || { echo "I couldn't open file name $1.aux"; exit 2; }
echo '\begin{thebibliography}{1}\end{thebibliography}' > "$1.bbl"
echo "This is BibTeX (fake)"
"#;

const FAILING_PDFLATEX: &str = r#"#!/bin/sh
echo "! LaTeX Error: File \`missing.sty' not found."
echo "emergency stop" >&2
exit 1
"#;

const SILENT_PDFLATEX: &str = r#"#!/bin/sh
echo '\relax' > outputs/paper.aux
exit 0
"#;

const SLEEPING_PANDOC: &str = r#"#!/bin/sh
exec sleep 30
"#;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A deployment: asset root, tool scripts, and a parent for workspaces.
struct Fixture {
    assets: TempDir,
    tools: TempDir,
    work: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let assets = tempfile::tempdir().unwrap();
        for name in DEFAULT_ASSETS {
            let path = assets.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, format!("% {name}\n")).unwrap();
        }
        let fixture = Self {
            assets,
            tools: tempfile::tempdir().unwrap(),
            work: tempfile::tempdir().unwrap(),
        };
        fixture.tool("pandoc", FAKE_PANDOC);
        fixture.tool("pdflatex", FAKE_PDFLATEX);
        fixture.tool("bibtex", FAKE_BIBTEX);
        fixture
    }

    /// Write (or replace) an executable script under the tools dir.
    fn tool(&self, name: &str, script: &str) -> String {
        let path = self.tools.path().join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn tool_path(&self, name: &str) -> String {
        self.tools.path().join(name).to_string_lossy().into_owned()
    }

    fn config(&self) -> BuildConfig {
        self.builder().build().unwrap()
    }

    fn builder(&self) -> edgequake_md2pdf::BuildConfigBuilder {
        BuildConfig::builder()
            .assets_root(self.assets.path())
            .work_root(self.work.path())
            .pandoc(self.tool_path("pandoc"))
            .pdflatex(self.tool_path("pdflatex"))
            .bibtex(self.tool_path("bibtex"))
            .timeout_secs(30)
    }

    fn work_entries(&self) -> usize {
        std::fs::read_dir(self.work.path()).unwrap().count()
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn figures_zip() -> Vec<u8> {
    zip_bytes(&[
        ("result_plots/plot.png", b"\x89PNG fake"),
        ("diagram.pdf", b"%PDF-1.4 figure"),
    ])
}

fn upload_with(bib_name: &str, figures: Vec<u8>) -> Upload {
    Upload::new(
        UploadFile::new(
            "paper.md",
            "---\ntitle: Test\nbibliography: library.bib\n---\n\nSee [@Test2024].\n",
        ),
        UploadFile::new(bib_name, "@article{Test2024, title={T}, year={2024}}\n"),
        UploadFile::new("figures.zip", figures),
    )
}

fn sample_upload() -> Upload {
    upload_with("library.bib", figures_zip())
}

// ── Successful builds ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_build_produces_pdf_and_removes_workspace() {
    let fx = Fixture::new();
    let output = build(sample_upload(), &fx.config()).await.unwrap();

    assert!(output.pdf.starts_with(b"%PDF"));
    assert_eq!(output.file_name, "paper.pdf");
    assert_eq!(output.content_type, "application/pdf");
    assert_eq!(output.stats.pdf_bytes, output.pdf.len() as u64);
    assert_eq!(output.stats.extracted_entries, 2);
    assert_eq!(output.stats.steps.len(), BuildStep::ALL.len());
    // result_plots/ and diagram.pdf are linked; .md and .bib are not.
    assert_eq!(output.stats.staged_links, 2);

    assert_eq!(fx.work_entries(), 0, "workspace left behind");
}

#[tokio::test]
async fn test_renamed_bibliography_is_also_staged_as_library_bib() {
    // The fake pdflatex requires outputs/library.bib, which only exists if
    // "My Refs (v2).bib" was duplicated under the fallback name.
    let fx = Fixture::new();
    let output = build(upload_with("My Refs (v2).bib", figures_zip()), &fx.config())
        .await
        .unwrap();
    assert!(output.pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_concurrent_builds_are_isolated() {
    let fx = Fixture::new();
    let config = fx.config();

    let (a, b) = tokio::join!(
        build(sample_upload(), &config),
        build(upload_with("other.bib", figures_zip()), &config),
    );
    assert!(a.unwrap().pdf.starts_with(b"%PDF"));
    assert!(b.unwrap().pdf.starts_with(b"%PDF"));
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_build_to_file_writes_atomically() {
    let fx = Fixture::new();
    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("nested/paper.pdf");

    let stats = build_to_file(sample_upload(), &out, &fx.config())
        .await
        .unwrap();

    let written = std::fs::read(&out).unwrap();
    assert!(written.starts_with(b"%PDF"));
    assert_eq!(stats.pdf_bytes, written.len() as u64);
    assert!(!out.with_extension("pdf.tmp").exists());
}

#[test]
fn test_build_sync() {
    let fx = Fixture::new();
    let output = build_sync(sample_upload(), &fx.config()).unwrap();
    assert!(output.pdf.starts_with(b"%PDF"));
}

#[test]
fn test_build_stats_serialise_to_json() {
    let fx = Fixture::new();
    let output = build_sync(sample_upload(), &fx.config()).unwrap();
    let json = serde_json::to_value(&output).unwrap();

    assert_eq!(json["file_name"], "paper.pdf");
    assert!(json.get("pdf").is_none(), "PDF bytes must not be serialised");
    assert_eq!(json["stats"]["steps"][0]["step"], "convert");
    assert_eq!(json["stats"]["steps"][7]["step"], "compile3");
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tool_failure_carries_log_and_cleans_up() {
    let fx = Fixture::new();
    fx.tool("pdflatex", FAILING_PDFLATEX);

    let err = build(sample_upload(), &fx.config()).await.unwrap_err();
    match &err {
        Md2PdfError::ToolFailure {
            step, code, log, ..
        } => {
            assert_eq!(*step, BuildStep::Compile1);
            assert_eq!(*code, Some(1));
            assert!(log.contains("missing.sty"), "log: {log}");
            assert!(log.ends_with("emergency stop"), "log: {log}");
        }
        other => panic!("expected ToolFailure, got {other:?}"),
    }
    assert!(err.diagnostic_log().is_some());
    assert_eq!(fx.work_entries(), 0, "workspace left behind after failure");
}

#[tokio::test]
async fn test_missing_pdf_is_artifact_missing() {
    let fx = Fixture::new();
    fx.tool("pdflatex", SILENT_PDFLATEX);

    let err = build(sample_upload(), &fx.config()).await.unwrap_err();
    assert!(matches!(err, Md2PdfError::ArtifactMissing { .. }), "{err:?}");
    assert!(err.to_string().starts_with("PDF was not generated"));
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_unsafe_archive_is_rejected_before_tools_run() {
    let fx = Fixture::new();
    // A pandoc that would leave a marker proves no tool ran.
    let marker = fx.tools.path().join("pandoc-ran");
    fx.tool(
        "pandoc",
        &format!("#!/bin/sh\ntouch '{}'\n", marker.display()),
    );

    let evil = zip_bytes(&[("ok.png", b"x"), ("../../escape.txt", b"pwned")]);
    let err = build(upload_with("library.bib", evil), &fx.config())
        .await
        .unwrap_err();

    assert!(matches!(err, Md2PdfError::PathTraversal { .. }), "{err:?}");
    assert!(err.to_string().starts_with("Zip file contains an unsafe path"));
    assert!(!marker.exists());
    assert_eq!(fx.work_entries(), 0);
    assert!(!fx.work.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_corrupt_archive_is_rejected() {
    let fx = Fixture::new();
    let err = build(upload_with("library.bib", b"not a zip".to_vec()), &fx.config())
        .await
        .unwrap_err();
    assert!(matches!(err, Md2PdfError::InvalidArchive { .. }), "{err:?}");
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_validation_reports_first_problem() {
    let fx = Fixture::new();
    let upload = Upload::new(
        UploadFile::new("paper.txt", "# x"),
        UploadFile::new("refs.bib", "@misc{a}"),
        UploadFile::new("figs.zip", figures_zip()),
    );
    let err = build(upload, &fx.config()).await.unwrap_err();
    assert!(matches!(
        err,
        Md2PdfError::Validation(ValidationError::MarkdownExtension)
    ));
    assert_eq!(err.to_string(), "Markdown file must be .md.");
    assert!(err.is_user_error());
}

#[tokio::test]
async fn test_missing_asset_is_reported() {
    let fx = Fixture::new();
    std::fs::remove_file(fx.assets.path().join("ieee/IEEEtran.cls")).unwrap();

    let err = build(sample_upload(), &fx.config()).await.unwrap_err();
    match err {
        Md2PdfError::MissingAsset { name } => assert_eq!(name, "ieee/IEEEtran.cls"),
        other => panic!("expected MissingAsset, got {other:?}"),
    }
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_missing_tool_is_tool_not_found() {
    let fx = Fixture::new();
    let config = fx
        .builder()
        .pandoc("md2pdf-test-no-such-pandoc")
        .build()
        .unwrap();
    let err = build(sample_upload(), &config).await.unwrap_err();
    assert!(matches!(err, Md2PdfError::ToolNotFound { .. }), "{err:?}");
    assert_eq!(fx.work_entries(), 0);
}

#[tokio::test]
async fn test_timeout_kills_tool_chain() {
    let fx = Fixture::new();
    fx.tool("pandoc", SLEEPING_PANDOC);
    let config = fx.builder().timeout_secs(1).build().unwrap();

    let started = std::time::Instant::now();
    let err = build(sample_upload(), &config).await.unwrap_err();

    assert!(matches!(err, Md2PdfError::Timeout { secs: 1 }), "{err:?}");
    assert!(started.elapsed().as_secs() < 10);
    assert_eq!(fx.work_entries(), 0);
}

// ── Progress callback ────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl BuildProgressCallback for Recorder {
    fn on_build_start(&self, total_steps: usize) {
        self.events.lock().unwrap().push(format!("start:{total_steps}"));
    }
    fn on_step_complete(&self, step: BuildStep, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done:{step:?}"));
    }
    fn on_step_error(&self, step: BuildStep, _error: &str) {
        self.events.lock().unwrap().push(format!("error:{step:?}"));
    }
    fn on_build_complete(&self, success: bool) {
        self.events.lock().unwrap().push(format!("complete:{success}"));
    }
}

#[tokio::test]
async fn test_progress_callback_sees_every_step() {
    let fx = Fixture::new();
    let recorder = Arc::new(Recorder::default());
    let config = fx
        .builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    build(sample_upload(), &config).await.unwrap();

    let events = recorder.events.lock().unwrap();
    assert_eq!(events.first().map(String::as_str), Some("start:8"));
    assert_eq!(events.last().map(String::as_str), Some("complete:true"));
    assert_eq!(events.iter().filter(|e| e.starts_with("done:")).count(), 8);
    assert!(events.contains(&"done:Bibtex".to_string()));
}

#[tokio::test]
async fn test_progress_callback_sees_failure() {
    let fx = Fixture::new();
    fx.tool("pdflatex", FAILING_PDFLATEX);
    let recorder = Arc::new(Recorder::default());
    let config = fx
        .builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    build(sample_upload(), &config).await.unwrap_err();

    let events = recorder.events.lock().unwrap();
    assert!(events.contains(&"error:Compile1".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("complete:false"));
    assert!(!events.contains(&"done:Bibtex".to_string()));
}

#[tokio::test]
async fn test_progress_callback_reports_missing_pdf_as_failure() {
    let fx = Fixture::new();
    fx.tool("pdflatex", SILENT_PDFLATEX);
    let recorder = Arc::new(Recorder::default());
    let config = fx
        .builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let err = build(sample_upload(), &config).await.unwrap_err();
    assert!(matches!(err, Md2PdfError::ArtifactMissing { .. }), "{err:?}");

    let events = recorder.events.lock().unwrap();
    // every tool step passed, but the build as a whole did not
    assert_eq!(events.iter().filter(|e| e.starts_with("done:")).count(), 8);
    assert_eq!(events.last().map(String::as_str), Some("complete:false"));
    assert_eq!(events.iter().filter(|e| e.starts_with("complete:")).count(), 1);
}

#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    let fx = Fixture::new();
    let config = fx
        .builder()
        .progress_callback(Arc::new(Recorder::default()))
        .build()
        .unwrap();
    let handle = tokio::spawn(async move { build(sample_upload(), &config).await });
    assert!(handle.await.unwrap().is_ok());
}

// ── Preflight ────────────────────────────────────────────────────────────────

#[test]
fn test_preflight_ready_with_fake_tools() {
    let fx = Fixture::new();
    let report = preflight(&fx.config());
    assert!(report.is_ready(), "{report:?}");
}

// ── Real toolchain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_real_toolchain() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let Some(assets) = std::env::var_os("MD2PDF_ASSETS_DIR").map(PathBuf::from) else {
        println!("SKIP — set MD2PDF_ASSETS_DIR to the directory holding ieee/");
        return;
    };
    for program in ["pandoc", "pdflatex", "bibtex"] {
        if find_program(program).is_none() {
            println!("SKIP — {program} not on PATH");
            return;
        }
    }

    let work = tempfile::tempdir().unwrap();
    let config = BuildConfig::builder()
        .assets_root(&assets)
        .work_root(work.path())
        .build()
        .unwrap();
    assert!(preflight(&config).is_ready());

    let output = build(real_upload(), &config).await.unwrap();
    assert!(output.pdf.starts_with(b"%PDF"));
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

fn real_upload() -> Upload {
    let markdown = "---\ntitle: End-to-End Test\nauthor: md2pdf\nbibliography: library.bib\n---\n\n\
# Introduction\n\nA citation [@Test2024].\n\n![A plot](result_plots/plot.png)\n";
    // Smallest valid PNG: 1x1 transparent pixel.
    let png: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78,
        0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00,
        0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];
    Upload::new(
        UploadFile::new("paper.md", markdown),
        UploadFile::new(
            "library.bib",
            "@article{Test2024,\n  author = {A. Author},\n  title = {A Test},\n  journal = {J. Tests},\n  year = {2024}\n}\n",
        ),
        UploadFile::new("figures.zip", zip_bytes(&[("result_plots/plot.png", png)])),
    )
}
