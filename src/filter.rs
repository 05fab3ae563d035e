//! Compiled include/exclude rules used by the scanner.
//!
//! Glob patterns are compiled once into a [`PatternSet`]. A pattern without a
//! `/` is matched against the file name only; a pattern containing `/` is
//! matched against the `/`-separated path relative to the scan root, where `*`
//! stays within one path component and `**` spans any number of them.
//!
//! [`FileFilter`] combines two pattern sets with the extra rules of the
//! configuration file (hidden files, exact names, extensions, regexes).

use crate::config::{ConfigError, FilterRules};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchScope {
    FileName,
    RelativePath,
}

/// A set of compiled glob patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<(Pattern, MatchScope)>,
}

impl PatternSet {
    /// Compiles every pattern, failing on the first invalid one.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                let scope = if raw.contains('/') {
                    MatchScope::RelativePath
                } else {
                    MatchScope::FileName
                };
                Pattern::new(raw)
                    .map(|pattern| (pattern, scope))
                    .map_err(|_| ConfigError::InvalidGlobPattern(raw.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true if any pattern matches `relative_path`.
    pub fn matches(&self, relative_path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let joined = slash_path(relative_path);

        self.patterns.iter().any(|(pattern, scope)| match scope {
            MatchScope::FileName => pattern.matches_with(&file_name, MATCH_OPTIONS),
            MatchScope::RelativePath => pattern.matches_with(&joined, MATCH_OPTIONS),
        })
    }
}

/// Joins path components with `/` regardless of platform.
fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Decides which scanned files become planning candidates.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include_hidden: bool,
    include: PatternSet,
    exclude: PatternSet,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_regexes: Vec<Regex>,
}

impl FileFilter {
    /// Compiles filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_hidden: rules.enable_hidden_files,
            include: PatternSet::new(&rules.include.patterns)?,
            exclude: PatternSet::new(&rules.exclude.patterns)?,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_regexes,
        })
    }

    /// A filter that accepts every file, hidden ones included.
    pub fn accept_all() -> Self {
        Self {
            include_hidden: true,
            include: PatternSet::default(),
            exclude: PatternSet::default(),
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_regexes: Vec::new(),
        }
    }

    /// Checks a file, given by its path relative to the scan root.
    ///
    /// A file is kept when:
    /// 1. it is not hidden, or hidden files are enabled
    /// 2. there are no include patterns, or one of them matches
    /// 3. no exclude rule (name, extension, glob, regex) matches
    pub fn should_include(&self, relative_path: &Path) -> bool {
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.include_hidden && is_hidden(&file_name) {
            return false;
        }

        if !self.include.is_empty() && !self.include.matches(relative_path) {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = relative_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.exclude.matches(relative_path) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }

    /// Checks whether the scanner should descend into a directory.
    pub fn should_descend(&self, relative_dir: &Path) -> bool {
        if self.include_hidden {
            return true;
        }
        relative_dir
            .file_name()
            .map(|n| !is_hidden(&n.to_string_lossy()))
            .unwrap_or(true)
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}
