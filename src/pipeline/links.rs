//! Staged links: same-name references at the workspace root pointing into
//! `paperFiles/`, so pandoc resolves `result_plots/x.png` from the root.
//!
//! The set is owned by a [`StagedLinks`] guard that removes every link it
//! created when dropped. The guard is scoped around the tool chain only, so
//! links are gone before the artifact is read, even when a tool fails.

use crate::error::Md2PdfError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Manuscript/bibliography suffixes never linked, so the canonical files
/// are not shadowed at the root.
const EXCLUDED_EXTENSIONS: &[&str] = &["md", "bib"];

/// Guard over the links created at a workspace root.
#[derive(Debug, Default)]
pub struct StagedLinks {
    links: Vec<PathBuf>,
}

impl StagedLinks {
    /// Link every entry directly inside `src_dir` into `root`.
    ///
    /// Entries are visited in name order. `.md`/`.bib` entries are skipped,
    /// as is any name already present at the root (first one wins).
    pub fn create(src_dir: &Path, root: &Path) -> Result<Self, Md2PdfError> {
        let mut staged = Self::default();
        if !src_dir.exists() {
            return Ok(staged);
        }

        let listing_err =
            |e: std::io::Error| Md2PdfError::io(format!("Listing {}", src_dir.display()), e);
        let mut entries = std::fs::read_dir(src_dir)
            .map_err(listing_err)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<PathBuf>, _>>()
            .map_err(listing_err)?;
        entries.sort();

        for entry in entries {
            let excluded = entry
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXCLUDED_EXTENSIONS.contains(&e));
            if excluded {
                continue;
            }
            let Some(name) = entry.file_name() else {
                continue;
            };
            let target = root.join(name);
            // symlink_metadata so a dangling link still counts as taken
            if target.symlink_metadata().is_ok() {
                debug!("Not linking {}: name taken at root", target.display());
                continue;
            }
            // On error `staged` drops here and removes what was already made.
            link(&entry, &target)
                .map_err(|e| Md2PdfError::io(format!("Linking {}", target.display()), e))?;
            staged.links.push(target);
        }

        debug!("Staged {} links in {}", staged.links.len(), root.display());
        Ok(staged)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.links
    }
}

impl Drop for StagedLinks {
    fn drop(&mut self) {
        for link in self.links.drain(..) {
            if let Err(e) = unlink(&link) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove staged link {}: {}", link.display(), e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn link(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn link(original: &Path, link: &Path) -> std::io::Result<()> {
    if original.is_dir() {
        std::os::windows::fs::symlink_dir(original, link)
    } else {
        std::os::windows::fs::symlink_file(original, link)
    }
}

#[cfg(unix)]
fn unlink(link: &Path) -> std::io::Result<()> {
    std::fs::remove_file(link)
}

#[cfg(windows)]
fn unlink(link: &Path) -> std::io::Result<()> {
    // directory symlinks on Windows are removed as directories
    std::fs::remove_file(link).or_else(|_| std::fs::remove_dir(link))
}
