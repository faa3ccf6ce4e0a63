//! Input discovery: glob expansion plus the file-name filter.
//!
//! # Examples
//!
//! ```no_run
//! use ironload::config::ReaderConfig;
//! use ironload::io::glob::discover_inputs;
//!
//! // Every visible XML dump under data/, in sorted order.
//! let files = discover_inputs(&["data/**/*.xml"], &ReaderConfig::default())?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use crate::config::ReaderConfig;
use anyhow::{Context, Result, bail};
use glob::glob;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Directories are never returned. A pattern that matches nothing yields an
/// empty vector, not an error.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a matched entry cannot be
/// read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }

    result.sort();
    Ok(result)
}

/// Like [`expand_glob`], but zero matches is an error.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    Ok(files)
}

/// Keep the paths whose file name matches `pattern`.
pub fn filter_by_name(paths: Vec<PathBuf>, pattern: &Regex) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.is_match(n))
        })
        .collect()
}

/// Expand every pattern (a directory means all files below it), apply
/// `input_file_pattern`, and return the sorted, de-duplicated container paths.
pub fn discover_inputs<S: AsRef<str>>(patterns: &[S], config: &ReaderConfig) -> Result<Vec<String>> {
    let name_filter = config
        .input_file_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("compile input_file_pattern")?;

    let mut found = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let expanded = if Path::new(pattern).is_dir() {
            let under = Path::new(pattern).join("**").join("*");
            expand_glob(&under.to_string_lossy())?
        } else {
            expand_glob(pattern)?
        };
        let before = expanded.len();
        let kept = match &name_filter {
            Some(re) => filter_by_name(expanded, re),
            None => expanded,
        };
        tracing::debug!(pattern, matched = before, kept = kept.len(), "expanded input pattern");
        found.extend(kept);
    }
    found.sort();
    found.dedup();
    Ok(found
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect())
}
