//! Configuration types for Markdown-to-PDF builds.
//!
//! Every build knob lives in [`BuildConfig`], built via
//! [`BuildConfigBuilder`]. The config is read-only during a build and shared
//! freely between concurrent builds; per-request state lives in the
//! workspace, never here.

use crate::error::Md2PdfError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Trusted support files copied into every workspace, relative to
/// [`BuildConfig::assets_root`]: template, document class, bibliography
/// style, citation style, and the pandoc/CSL compatibility fix.
pub const DEFAULT_ASSETS: &[&str] = &[
    "ieee/ieee-conference.tex",
    "ieee/IEEEtran.cls",
    "ieee/IEEEtran.bst",
    "ieee/ieee.csl",
    "ieee/pandoc-csl-fix.tex",
];

/// Relative path (inside the workspace) of the pandoc template.
pub const TEMPLATE_ASSET: &str = "ieee/ieee-conference.tex";

/// Default total upload bound: 100 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Default bound on the declared uncompressed size of the figure archive.
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 512 * 1024 * 1024;

/// Default wall-clock bound on the tool chain.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for a PDF build.
///
/// Built via [`BuildConfig::builder()`] or using [`BuildConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::BuildConfig;
///
/// let config = BuildConfig::builder()
///     .assets_root("/srv/md2pdf")
///     .timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout_secs, 120);
/// ```
#[derive(Clone)]
pub struct BuildConfig {
    /// Trusted directory the asset list is resolved against. Default: `.`.
    pub assets_root: PathBuf,

    /// Asset paths relative to `assets_root`, copied verbatim into the
    /// workspace. Default: [`DEFAULT_ASSETS`].
    pub assets: Vec<String>,

    /// Markup converter program. Default: `pandoc`.
    pub pandoc: String,

    /// Typesetting compiler program. Default: `pdflatex`.
    pub pdflatex: String,

    /// Bibliography resolver program. Default: `bibtex`.
    pub bibtex: String,

    /// Wall-clock bound on the whole tool chain, in seconds. Default: 300.
    ///
    /// When it expires the running subprocess is killed and the build fails
    /// with [`Md2PdfError::Timeout`].
    pub timeout_secs: u64,

    /// Maximum combined size of the three uploads. Default: 100 MiB.
    pub max_upload_bytes: u64,

    /// Maximum declared uncompressed size of the figure archive. Default: 512 MiB.
    pub max_extracted_bytes: u64,

    /// Parent directory for ephemeral workspaces. Default: system temp dir.
    pub work_root: Option<PathBuf>,

    /// Receives step-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            assets_root: PathBuf::from("."),
            assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            pandoc: "pandoc".to_string(),
            pdflatex: "pdflatex".to_string(),
            bibtex: "bibtex".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
            work_root: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("assets_root", &self.assets_root)
            .field("assets", &self.assets)
            .field("pandoc", &self.pandoc)
            .field("pdflatex", &self.pdflatex)
            .field("bibtex", &self.bibtex)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_extracted_bytes", &self.max_extracted_bytes)
            .field("work_root", &self.work_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BuildProgressCallback>"),
            )
            .finish()
    }
}

impl BuildConfig {
    /// Create a new builder for `BuildConfig`.
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BuildConfig`].
#[derive(Debug)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn assets_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.assets_root = dir.into();
        self
    }

    pub fn assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn pandoc(mut self, program: impl Into<String>) -> Self {
        self.config.pandoc = program.into();
        self
    }

    pub fn pdflatex(mut self, program: impl Into<String>) -> Self {
        self.config.pdflatex = program.into();
        self
    }

    pub fn bibtex(mut self, program: impl Into<String>) -> Self {
        self.config.bibtex = program.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn max_extracted_bytes(mut self, bytes: u64) -> Self {
        self.config.max_extracted_bytes = bytes;
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BuildConfig, Md2PdfError> {
        let c = &self.config;
        if c.assets.is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "Asset list must not be empty".into(),
            ));
        }
        if !c.assets.iter().any(|a| a == TEMPLATE_ASSET) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Asset list must include the pandoc template {TEMPLATE_ASSET}"
            )));
        }
        if c.timeout_secs == 0 {
            return Err(Md2PdfError::InvalidConfig("Timeout must be ≥ 1s".into()));
        }
        if c.max_upload_bytes == 0 || c.max_extracted_bytes == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Size limits must be ≥ 1 byte".into(),
            ));
        }
        for program in [&c.pandoc, &c.pdflatex, &c.bibtex] {
            if program.trim().is_empty() {
                return Err(Md2PdfError::InvalidConfig(
                    "Tool program names must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
