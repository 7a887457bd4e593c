//! Result extraction: read the compiled PDF out of the workspace.

use crate::error::Md2PdfError;
use crate::pipeline::workspace::Workspace;
use tracing::{debug, warn};

/// Leading bytes of every PDF file.
pub const PDF_SIGNATURE: &[u8] = b"%PDF";

/// Read `outputs/paper.pdf` fully into memory.
///
/// A missing file after a clean tool run is reported as
/// [`Md2PdfError::ArtifactMissing`], distinct from a tool failure.
pub async fn read_artifact(ws: &Workspace) -> Result<Vec<u8>, Md2PdfError> {
    let path = ws.output_file("pdf");
    if !path.is_file() {
        return Err(Md2PdfError::ArtifactMissing { path });
    }
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| Md2PdfError::io(format!("Reading {}", path.display()), e))?;

    if !bytes.starts_with(PDF_SIGNATURE) {
        warn!("{} does not start with a PDF signature", path.display());
    }
    debug!("Read artifact {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}
