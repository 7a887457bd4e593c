//! Figure-archive sanitiser and extractor.
//!
//! Extraction is two-pass. The first pass resolves every entry name against
//! the destination and rejects the whole archive if any entry escapes it, or
//! if the declared uncompressed size exceeds the limit. Only then does the
//! second pass write anything, so a rejected archive leaves no files behind.
//!
//! Resolution is lexical: the entry is joined onto the destination, `.` is
//! dropped, `..` pops one component, and the result must still lie under the
//! destination. A name may step out and back in (`a/../../paperFiles/x`).
//! An absolute name or drive prefix is an escape on its own. The destination
//! is canonicalised first so that a symlinked temp dir still compares equal.

use crate::error::Md2PdfError;
use std::io::{Cursor, Read, Seek};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Summary of a successful extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    /// Entries written (files and directories).
    pub entries: usize,
    /// Bytes written across all files.
    pub bytes: u64,
}

/// Resolve `entry` inside `dest`, or `None` if it would land outside.
///
/// `dest` is expected to be absolute and already canonical.
pub fn resolve_entry(dest: &Path, entry: &str) -> Option<PathBuf> {
    let mut resolved = dest.to_path_buf();
    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    resolved.starts_with(dest).then_some(resolved)
}

/// Check every entry of `archive` without writing anything.
///
/// Returns the resolved targets in archive order, paired with the entry index.
fn plan<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest: &Path,
    max_bytes: u64,
) -> Result<Vec<(usize, PathBuf, bool)>, Md2PdfError> {
    let mut declared: u64 = 0;
    let mut targets = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| Md2PdfError::InvalidArchive {
                detail: e.to_string(),
            })?;
        let name = entry.name().to_string();

        let target = match resolve_entry(dest, &name) {
            Some(t) => t,
            None => {
                warn!("Rejecting archive: entry '{}' escapes {}", name, dest.display());
                return Err(Md2PdfError::PathTraversal { entry: name });
            }
        };

        declared = declared.saturating_add(entry.size());
        if declared > max_bytes {
            return Err(Md2PdfError::ArchiveTooLarge {
                limit: max_bytes,
                actual: declared,
            });
        }

        targets.push((index, target, entry.is_dir()));
    }

    Ok(targets)
}

/// Validate and extract a zip archive held in memory into `dest`.
///
/// `dest` must exist. Fails with [`Md2PdfError::PathTraversal`] before any
/// write if an entry resolves outside `dest`.
pub fn extract_zip(bytes: &[u8], dest: &Path, max_bytes: u64) -> Result<ExtractReport, Md2PdfError> {
    let dest = dest
        .canonicalize()
        .map_err(|e| Md2PdfError::io(format!("Resolving {}", dest.display()), e))?;

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Md2PdfError::InvalidArchive {
            detail: e.to_string(),
        })?;

    let targets = plan(&mut archive, &dest, max_bytes)?;
    debug!("Archive validated: {} entries", targets.len());

    let mut report = ExtractReport::default();
    for (index, target, is_dir) in targets {
        if is_dir || target == dest {
            std::fs::create_dir_all(&target)
                .map_err(|e| Md2PdfError::io(format!("Creating {}", target.display()), e))?;
            report.entries += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Md2PdfError::io(format!("Creating {}", parent.display()), e))?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| Md2PdfError::InvalidArchive {
                detail: e.to_string(),
            })?;
        let mut out = std::fs::File::create(&target)
            .map_err(|e| Md2PdfError::io(format!("Writing {}", target.display()), e))?;
        let written = std::io::copy(&mut entry, &mut out).map_err(|e| {
            Md2PdfError::InvalidArchive {
                detail: format!("{}: {e}", entry.name()),
            }
        })?;

        report.entries += 1;
        report.bytes += written;
    }

    info!(
        "Extracted {} entries ({} bytes) into {}",
        report.entries,
        report.bytes,
        dest.display()
    );
    Ok(report)
}
