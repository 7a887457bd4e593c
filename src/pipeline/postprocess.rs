//! File-level fix-ups between tool invocations.
//!
//! - [`fix_citations`] rewrites pandoc's natbib `\citep` into the plain
//!   `\cite` that IEEEtran's numeric style expects.
//! - [`remove_stale_byproducts`] clears compiler outputs of an earlier run
//!   so they cannot leak into this one.
//! - [`stage_bibliographies`] copies every `.bib` next to the `.tex`, where
//!   bibtex looks for them first.

use crate::error::Md2PdfError;
use std::path::Path;
use tracing::debug;

/// Macro emitted by pandoc `--natbib` for parenthetical citations.
pub const NATBIB_CITE: &str = r"\citep";

/// Replacement accepted by the IEEE document class.
pub const IEEE_CITE: &str = r"\cite";

/// Byproduct extensions of `outputs/paper.*` removed before compiling.
pub const STALE_EXTENSIONS: &[&str] = &["aux", "bbl", "blg", "out", "log", "pdf"];

/// Rewrite `\citep` to `\cite` everywhere in `tex`.
pub fn rewrite_citations(tex: &str) -> String {
    tex.replace(NATBIB_CITE, IEEE_CITE)
}

/// Apply [`rewrite_citations`] to the file at `path` in place.
///
/// Returns the number of rewritten occurrences.
pub async fn fix_citations(path: &Path) -> Result<usize, Md2PdfError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Md2PdfError::io(format!("Reading {}", path.display()), e))?;
    let count = text.matches(NATBIB_CITE).count();
    tokio::fs::write(path, rewrite_citations(&text))
        .await
        .map_err(|e| Md2PdfError::io(format!("Writing {}", path.display()), e))?;
    debug!("Rewrote {} citation macros in {}", count, path.display());
    Ok(count)
}

/// Delete `<output_dir>/<job>.<ext>` for every stale extension. Missing
/// files are fine.
pub async fn remove_stale_byproducts(output_dir: &Path, job: &str) -> Result<usize, Md2PdfError> {
    let mut removed = 0;
    for ext in STALE_EXTENSIONS {
        let path = output_dir.join(format!("{job}.{ext}"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Md2PdfError::io(format!("Removing {}", path.display()), e)),
        }
    }
    if removed > 0 {
        debug!("Removed {} stale byproducts from {}", removed, output_dir.display());
    }
    Ok(removed)
}

/// Copy every `*.bib` file directly inside `paper_dir` into `output_dir`.
pub async fn stage_bibliographies(paper_dir: &Path, output_dir: &Path) -> Result<usize, Md2PdfError> {
    let mut entries = tokio::fs::read_dir(paper_dir)
        .await
        .map_err(|e| Md2PdfError::io(format!("Listing {}", paper_dir.display()), e))?;

    let mut copied = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Md2PdfError::io(format!("Listing {}", paper_dir.display()), e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bib") || !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        tokio::fs::copy(&path, output_dir.join(name))
            .await
            .map_err(|e| Md2PdfError::io(format!("Copying {}", path.display()), e))?;
        copied += 1;
    }
    debug!("Staged {} bibliography files", copied);
    Ok(copied)
}
