//! Ephemeral per-build workspace.
//!
//! ```text
//! ieee-convert-XXXXXX/
//! ├── ieee/            trusted assets, copied from the assets root
//! ├── paperFiles/      paper.md, <bib>, library.bib, extracted figures
//! ├── outputs/         paper.tex and every compiler byproduct
//! └── <staged links>   created by `links`, removed right after the tool chain
//! ```
//!
//! The directory is a [`TempDir`]: dropping the [`Workspace`] removes the
//! whole tree on every exit path, including panics and cancelled futures.

use crate::config::BuildConfig;
use crate::error::Md2PdfError;
use crate::pipeline::archive::{self, ExtractReport};
use crate::pipeline::upload::{ValidatedUpload, FALLBACK_BIB_NAME};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "ieee-convert-";

/// Manuscript subdirectory.
pub const PAPER_DIR: &str = "paperFiles";

/// Output subdirectory (relative to the workspace root).
pub const OUTPUT_DIR: &str = "outputs";

/// Asset subdirectory, mirroring the `ieee/` prefix of the asset list.
pub const ASSET_DIR: &str = "ieee";

/// Canonical manuscript name inside [`PAPER_DIR`].
pub const MANUSCRIPT_NAME: &str = "paper.md";

/// Base name shared by the intermediate `.tex` and all compiler outputs.
pub const JOB_NAME: &str = "paper";

/// A staged, isolated build directory. Removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    /// Create an empty workspace under `config.work_root` (or the system
    /// temp dir) with its `paperFiles/` and `outputs/` subtrees.
    pub fn create(config: &BuildConfig) -> Result<Self, Md2PdfError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match &config.work_root {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Md2PdfError::io("Creating workspace", e))?;

        // Canonical root so archive resolution and link targets agree.
        let root = dir
            .path()
            .canonicalize()
            .map_err(|e| Md2PdfError::io("Resolving workspace", e))?;

        let ws = Self { dir, root };
        for sub in [ws.paper_dir(), ws.output_dir()] {
            std::fs::create_dir_all(&sub)
                .map_err(|e| Md2PdfError::io(format!("Creating {}", sub.display()), e))?;
        }
        debug!("Created workspace {}", ws.root.display());
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paper_dir(&self) -> PathBuf {
        self.root.join(PAPER_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.root.join(ASSET_DIR)
    }

    pub fn manuscript_path(&self) -> PathBuf {
        self.paper_dir().join(MANUSCRIPT_NAME)
    }

    /// `outputs/paper.<ext>` as an absolute path.
    pub fn output_file(&self, ext: &str) -> PathBuf {
        self.output_dir().join(format!("{JOB_NAME}.{ext}"))
    }

    /// Remove the workspace now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<(), Md2PdfError> {
        let root = self.root.clone();
        self.dir
            .close()
            .map_err(|e| Md2PdfError::io(format!("Removing workspace {}", root.display()), e))?;
        debug!("Removed workspace {}", root.display());
        Ok(())
    }

    /// Copy every configured asset into the workspace, preserving its
    /// relative path. The first absent asset aborts with `MissingAsset`.
    pub fn copy_assets(&self, config: &BuildConfig) -> Result<(), Md2PdfError> {
        for name in &config.assets {
            let src = config.assets_root.join(name);
            if !src.is_file() {
                return Err(Md2PdfError::MissingAsset { name: name.clone() });
            }
            let target = self.root.join(name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Md2PdfError::io(format!("Creating {}", parent.display()), e))?;
            }
            std::fs::copy(&src, &target)
                .map_err(|e| Md2PdfError::io(format!("Copying asset {name}"), e))?;
        }
        debug!("Copied {} assets", config.assets.len());
        Ok(())
    }

    /// Write the manuscript and bibliography, then extract the figures.
    ///
    /// The bibliography keeps its sanitised name and, when that differs from
    /// `library.bib`, is duplicated under the fallback name too.
    pub fn stage_upload(
        &self,
        upload: &ValidatedUpload,
        max_extracted_bytes: u64,
    ) -> Result<ExtractReport, Md2PdfError> {
        let paper_dir = self.paper_dir();
        write_file(&self.manuscript_path(), &upload.markdown)?;

        let bib_path = paper_dir.join(&upload.bib_name);
        write_file(&bib_path, &upload.bibliography)?;
        if upload.bib_name != FALLBACK_BIB_NAME {
            let fallback = paper_dir.join(FALLBACK_BIB_NAME);
            std::fs::copy(&bib_path, &fallback)
                .map_err(|e| Md2PdfError::io(format!("Copying bibliography to {FALLBACK_BIB_NAME}"), e))?;
        }

        archive::extract_zip(&upload.figures, &paper_dir, max_extracted_bytes)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Md2PdfError> {
    std::fs::write(path, bytes).map_err(|e| Md2PdfError::io(format!("Writing {}", path.display()), e))
}

/// Create a workspace and stage everything a build needs into it.
///
/// On any error the half-built workspace is dropped, and with it removed.
pub fn stage(
    upload: &ValidatedUpload,
    config: &BuildConfig,
) -> Result<(Workspace, ExtractReport), Md2PdfError> {
    let ws = Workspace::create(config)?;
    ws.copy_assets(config)?;
    let report = ws.stage_upload(upload, config.max_extracted_bytes)?;
    info!(
        "Staged workspace {} ({} archive entries)",
        ws.root().display(),
        report.entries
    );
    Ok((ws, report))
}
