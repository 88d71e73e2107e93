//! Include/exclude path filtering for a single rule.

use std::path::Path;

use regex::Regex;

use super::error::{PatternKind, WatchError};

/// Decides whether a changed path should count towards a reload.
///
/// Patterns are regular expressions searched anywhere in the path (not
/// anchored unless the pattern anchors itself). An empty pattern string is
/// the same as no pattern.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl PatternFilter {
    /// Compile the include and exclude patterns.
    ///
    /// Returns [`WatchError::InvalidPattern`] naming the offending side when
    /// either pattern fails to compile.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, WatchError> {
        Ok(Self {
            include: compile(PatternKind::Include, include)?,
            exclude: compile(PatternKind::Exclude, exclude)?,
        })
    }

    /// Returns true if `path` should be reported.
    ///
    /// The exclude pattern is checked first and wins over the include pattern.
    pub fn accepts(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();

        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&path) {
                return false;
            }
        }

        match &self.include {
            Some(include) => include.is_match(&path),
            None => true,
        }
    }

    pub fn has_include(&self) -> bool {
        self.include.is_some()
    }

    pub fn has_exclude(&self) -> bool {
        self.exclude.is_some()
    }
}

fn compile(kind: PatternKind, pattern: Option<&str>) -> Result<Option<Regex>, WatchError> {
    match pattern {
        Some(p) if !p.is_empty() => {
            Regex::new(p)
                .map(Some)
                .map_err(|e| WatchError::InvalidPattern {
                    kind,
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}
