//! Pipeline stages for Markdown-to-PDF builds.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ workspace ──▶ links ──▶ runner ──▶ artifact
//!  (check)    (stage +      (root     (pandoc,    (read PDF)
//!             archive)      links)    LaTeX ×3)
//! ```
//!
//! 1. [`upload`]    — validate the three files, sanitise the bibliography name
//! 2. [`workspace`] — create the temp tree, copy assets, write inputs; figures
//!    go through [`archive`], which refuses any entry escaping `paperFiles/`
//! 3. [`links`]     — link `paperFiles/` siblings into the root for the
//!    duration of the tool chain
//! 4. [`runner`]    — the fail-fast step machine; [`env`] builds its search
//!    paths and [`postprocess`] does the in-process steps
//! 5. [`artifact`]  — read `outputs/paper.pdf`

pub mod archive;
pub mod artifact;
pub mod env;
pub mod links;
pub mod postprocess;
pub mod runner;
pub mod upload;
pub mod workspace;
