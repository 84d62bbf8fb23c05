//! Core types for rootsync
//!
//! A [`RoleDescriptor`] pairs a directory role with a normalized,
//! workspace-relative path. Descriptors are plain values: two descriptors with
//! the same `(role, path)` are interchangeable.

use crate::paths::NormalizedPath;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Roles
// ============================================================================

/// The function a directory serves within its content root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleKind {
    /// Production sources
    #[default]
    SourceRoot,
    /// Production resources
    ResourceRoot,
    /// Test sources
    TestSourceRoot,
    /// Test resources
    TestResourceRoot,
}

impl RoleKind {
    pub const ALL: [RoleKind; 4] = [
        Self::SourceRoot,
        Self::ResourceRoot,
        Self::TestSourceRoot,
        Self::TestResourceRoot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceRoot => "source-root",
            Self::ResourceRoot => "resource-root",
            Self::TestSourceRoot => "test-source-root",
            Self::TestResourceRoot => "test-resource-root",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "source-root" | "source" => Some(Self::SourceRoot),
            "resource-root" | "resource" => Some(Self::ResourceRoot),
            "test-source-root" | "test-source" => Some(Self::TestSourceRoot),
            "test-resource-root" | "test-resource" => Some(Self::TestResourceRoot),
            _ => None,
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// A role applied to a workspace-relative directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub role: RoleKind,
    pub path: NormalizedPath,
}

impl RoleDescriptor {
    pub fn new(role: RoleKind, path: impl Into<NormalizedPath>) -> Self {
        Self {
            role,
            path: path.into(),
        }
    }

    pub fn source_root(path: &str) -> Self {
        Self::new(RoleKind::SourceRoot, path)
    }
}

impl fmt::Display for RoleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.path)
    }
}

/// Ordered set of descriptors.
///
/// Membership is by `(role, path)`; insertion order is kept for persistence
/// round-trips but carries no meaning for reconciliation, and equality
/// ignores it. Duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorSet {
    entries: IndexSet<RoleDescriptor>,
}

/// Descriptors currently declared by the listing file.
pub type DeclaredSet = DescriptorSet;

/// Descriptors applied and persisted by the last reconciliation.
pub type ManagedSet = DescriptorSet;

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor; returns false when it was already present.
    pub fn insert(&mut self, descriptor: RoleDescriptor) -> bool {
        self.entries.insert(descriptor)
    }

    pub fn remove(&mut self, descriptor: &RoleDescriptor) -> bool {
        self.entries.shift_remove(descriptor)
    }

    pub fn contains(&self, descriptor: &RoleDescriptor) -> bool {
        self.entries.contains(descriptor)
    }

    /// True when any descriptor, of any role, names `path`.
    pub fn contains_path(&self, path: &NormalizedPath) -> bool {
        self.entries.iter().any(|d| &d.path == path)
    }

    /// Descriptors naming `path`, in set order.
    pub fn with_path<'a>(
        &'a self,
        path: &'a NormalizedPath,
    ) -> impl Iterator<Item = &'a RoleDescriptor> + 'a {
        self.entries.iter().filter(move |d| &d.path == path)
    }

    /// Descriptors in `self` but not in `other`.
    pub fn difference(&self, other: &DescriptorSet) -> DescriptorSet {
        self.entries
            .iter()
            .filter(|d| !other.contains(d))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RoleDescriptor> for DescriptorSet {
    fn from_iter<I: IntoIterator<Item = RoleDescriptor>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DescriptorSet {
    type Item = RoleDescriptor;
    type IntoIter = indexmap::set::IntoIter<RoleDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a DescriptorSet {
    type Item = &'a RoleDescriptor;
    type IntoIter = indexmap::set::Iter<'a, RoleDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
