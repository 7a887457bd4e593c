//! Search-path environment for the TeX tool chain.
//!
//! Built once per build as an immutable value and applied to each child
//! process with `Command::envs`. The parent process environment is read
//! (to extend any inherited value) but never modified, so concurrent builds
//! cannot see each other's paths.
//!
//! Each variable is `<dir>:<dir>:…:<inherited>:`. The trailing empty entry
//! tells kpathsea to append its compiled-in default path.

use crate::pipeline::workspace::Workspace;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Template / class search path (`\documentclass`, `\input`).
pub const TEXINPUTS: &str = "TEXINPUTS";
/// `.bib` search path for bibtex.
pub const BIBINPUTS: &str = "BIBINPUTS";
/// `.bst` search path for bibtex.
pub const BSTINPUTS: &str = "BSTINPUTS";

#[cfg(windows)]
const PATH_SEP: &str = ";";
#[cfg(not(windows))]
const PATH_SEP: &str = ":";

/// Environment overrides handed to every tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEnv {
    vars: Vec<(String, OsString)>,
}

impl ToolEnv {
    /// Search paths for `ws`, extending whatever the current process has set.
    pub fn for_workspace(ws: &Workspace) -> Self {
        Self::with_inherited(
            &ws.asset_dir(),
            &ws.paper_dir(),
            &ws.output_dir(),
            |key| std::env::var_os(key),
        )
    }

    /// Search paths with an explicit lookup for inherited values.
    pub fn with_inherited<F>(asset_dir: &Path, paper_dir: &Path, output_dir: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let layout: [(&str, Vec<PathBuf>); 3] = [
            (TEXINPUTS, vec![asset_dir.into()]),
            (BIBINPUTS, vec![paper_dir.into(), output_dir.into()]),
            (
                BSTINPUTS,
                vec![asset_dir.into(), paper_dir.into(), output_dir.into()],
            ),
        ];

        let vars = layout
            .into_iter()
            .map(|(key, dirs)| {
                let value = search_path(&dirs, lookup(key));
                (key.to_string(), value)
            })
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// `(name, value)` pairs, ready for `Command::envs`.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_os_str()))
    }
}

fn search_path(dirs: &[PathBuf], inherited: Option<OsString>) -> OsString {
    let mut value = OsString::new();
    for dir in dirs {
        value.push(dir);
        value.push(PATH_SEP);
    }
    if let Some(existing) = inherited {
        value.push(existing);
    }
    value.push(PATH_SEP);
    value
}
