//! Upload validation: turn three optional user files into a checked triple.
//!
//! Nothing here touches the file system. A triple that fails validation is
//! rejected before any workspace exists.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Stored name used when the bibliography name sanitises to nothing, and the
/// name the manuscript's `bibliography:` field is expected to cite.
pub const FALLBACK_BIB_NAME: &str = "library.bib";

/// One uploaded file: the client-supplied name and its content.
#[derive(Debug, Clone, Default)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file, keeping only its final path component as the name.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { filename, bytes })
    }

    fn is_present(&self) -> bool {
        !self.filename.is_empty() && !self.bytes.is_empty()
    }
}

/// The three files a build needs, any of which may be missing.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub markdown: Option<UploadFile>,
    pub bibliography: Option<UploadFile>,
    pub figures: Option<UploadFile>,
}

impl Upload {
    pub fn new(markdown: UploadFile, bibliography: UploadFile, figures: UploadFile) -> Self {
        Self {
            markdown: Some(markdown),
            bibliography: Some(bibliography),
            figures: Some(figures),
        }
    }

    /// Check presence, extensions, and total size, in that order.
    pub fn validate(self, max_upload_bytes: u64) -> Result<ValidatedUpload, ValidationError> {
        let markdown = self
            .markdown
            .filter(UploadFile::is_present)
            .ok_or(ValidationError::MissingMarkdown)?;
        let bibliography = self
            .bibliography
            .filter(UploadFile::is_present)
            .ok_or(ValidationError::MissingBibliography)?;
        let figures = self
            .figures
            .filter(UploadFile::is_present)
            .ok_or(ValidationError::MissingFigures)?;

        if !has_extension(&markdown.filename, "md") {
            return Err(ValidationError::MarkdownExtension);
        }
        if !has_extension(&bibliography.filename, "bib") {
            return Err(ValidationError::BibliographyExtension);
        }
        if !has_extension(&figures.filename, "zip") {
            return Err(ValidationError::FiguresExtension);
        }

        let total =
            (markdown.bytes.len() + bibliography.bytes.len() + figures.bytes.len()) as u64;
        if total > max_upload_bytes {
            return Err(ValidationError::TooLarge {
                limit: max_upload_bytes,
                actual: total,
            });
        }

        let bib_name = match secure_filename(&bibliography.filename) {
            name if name.is_empty() => FALLBACK_BIB_NAME.to_string(),
            name => name,
        };
        debug!(
            "Validated upload: {} + {} ({}) + {}, {} bytes",
            markdown.filename, bibliography.filename, bib_name, figures.filename, total
        );

        Ok(ValidatedUpload {
            markdown: markdown.bytes,
            bibliography: bibliography.bytes,
            bib_name,
            figures: figures.bytes,
        })
    }
}

/// A triple that passed validation. Only content and the sanitised
/// bibliography name survive; client names are never used as paths.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub markdown: Vec<u8>,
    pub bibliography: Vec<u8>,
    pub bib_name: String,
    pub figures: Vec<u8>,
}

/// Case-insensitive check of the text after the last `.`.
pub fn has_extension(filename: &str, ext: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, suffix)) => suffix.eq_ignore_ascii_case(ext),
        None => false,
    }
}

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM0", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
    "COM8", "COM9", "LPT0", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reduce a client-supplied filename to a safe single path component.
///
/// The name is NFKD-decomposed and reduced to ASCII (`ü` → `u`), path
/// separators become whitespace, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is removed, and leading/trailing `.`/`_` are
/// stripped. `\` is a separator and device names such as `CON` get a `_`
/// prefix only on Windows. The result may be empty.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if is_separator(c) { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = RE_UNSAFE_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cfg!(windows) && is_device_name(trimmed) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

fn is_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or_default();
    !name.is_empty() && WINDOWS_DEVICE_NAMES.contains(&stem.to_ascii_uppercase().as_str())
}
