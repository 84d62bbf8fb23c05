//! Lexical path normalization.
//!
//! Two root conventions exist and must not be mixed:
//! - relative form (descriptor storage): the workspace root is `""`
//! - absolute form (URL building): the workspace root is `"/"`
//!
//! Both forms trim whitespace, resolve `.` and `..` without touching the
//! filesystem, collapse repeated separators and drop leading/trailing
//! separators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root token used by the absolute form.
pub const ROOT_TOKEN: &str = "/";

/// A workspace-relative path in relative normal form.
///
/// The empty string denotes the workspace root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Normalize `raw` into relative form.
    pub fn new(raw: &str) -> Self {
        Self(normalize_relative(raw))
    }

    /// The workspace root.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments, empty for the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(ROOT_TOKEN)
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for NormalizedPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Normalize into relative form; the root becomes `""`.
pub fn normalize_relative(raw: &str) -> String {
    collapse(raw)
}

/// Normalize into absolute form; the root becomes `"/"`.
pub fn normalize_absolute(raw: &str) -> String {
    let path = collapse(raw);
    if path.is_empty() {
        ROOT_TOKEN.to_string()
    } else {
        path
    }
}

/// Absent input stays absent instead of turning into a placeholder path.
pub fn normalize_opt(raw: Option<&str>) -> Option<NormalizedPath> {
    raw.map(NormalizedPath::new)
}

fn collapse(raw: &str) -> String {
    let trimmed = raw.trim();
    let anchored = trimmed.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                // `..` above an anchored root is the root itself.
                _ if anchored => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    parts.join("/")
}
