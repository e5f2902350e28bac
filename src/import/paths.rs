// src/import/paths.rs

//! Mapping of host listing paths onto the internal absolute convention.

/// Top-level directories of version-control metadata.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Why a listing path does not become a project path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    /// Contains a `..` segment or normalizes to nothing.
    UnsafePath,
    /// Lies inside `.git/`, `.hg/` or `.svn/`.
    VcsMetadata,
    /// Not below the selected wrapper directory.
    OutsideWrapper,
}

/// Normalize a relative listing path into an absolute project path.
///
/// `wrapper` is the directory whose contents are imported (a subpath
/// selection or an archive root); it is stripped from the result and
/// entries outside it are rejected.
pub fn normalize_entry_path(raw: &str, wrapper: Option<&str>) -> Result<String, PathRejection> {
    let mut segments: Vec<&str> = raw
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.iter().any(|s| *s == "..") {
        return Err(PathRejection::UnsafePath);
    }

    if let Some(wrapper) = wrapper {
        let prefix: Vec<&str> = wrapper.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() <= prefix.len() || segments[..prefix.len()] != prefix[..] {
            return Err(PathRejection::OutsideWrapper);
        }
        segments.drain(..prefix.len());
    }

    if segments.is_empty() {
        return Err(PathRejection::UnsafePath);
    }

    if segments.iter().any(|s| VCS_DIRS.contains(s)) {
        return Err(PathRejection::VcsMetadata);
    }

    Ok(format!("/{}", segments.join("/")))
}
