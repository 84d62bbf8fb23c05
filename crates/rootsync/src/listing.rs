//! Listing Loader
//!
//! The listing is UTF-8 text with one path per line. Lines that are empty
//! after trimming, or start with `#` or `//`, are ignored; every other line
//! is normalized into a descriptor carrying the listing's role.

use crate::error::Result;
use crate::paths::NormalizedPath;
use crate::types::{DeclaredSet, RoleDescriptor, RoleKind};
use crate::workspace::FileSystem;

/// Load the listing at `listing`, tagging every entry with `role`.
///
/// An absent listing declares nothing. Any other read failure is returned as
/// is, so no partial set is ever produced.
pub fn load_listing<F: FileSystem + ?Sized>(
    fs: &F,
    listing: &NormalizedPath,
    role: RoleKind,
) -> Result<DeclaredSet> {
    let handle = match fs.resolve(listing) {
        Ok(handle) => handle,
        Err(e) if e.is_not_found() => {
            tracing::debug!(listing = %listing, "Listing file absent; nothing declared");
            return Ok(DeclaredSet::new());
        }
        Err(e) => return Err(e),
    };

    let content = match fs.read_to_string(&handle) {
        Ok(content) => content,
        // Deleted between resolve and read.
        Err(e) if e.is_not_found() => return Ok(DeclaredSet::new()),
        Err(e) => return Err(e),
    };

    let declared = parse_listing(&content, role);
    tracing::debug!(listing = %listing, count = declared.len(), "Listing loaded");
    Ok(declared)
}

/// Parse listing text into descriptors.
pub fn parse_listing(content: &str, role: RoleKind) -> DeclaredSet {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !is_ignored(line))
        .map(|line| RoleDescriptor::new(role, NormalizedPath::new(line)))
        .collect()
}

fn is_ignored(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//")
}
