// src/import/host.rs

//! Remote project host abstraction.
//!
//! The pipeline only needs four lookups from a host; [`GitHubHost`] provides
//! them over the GitHub REST API and tests provide an in-memory host.
//!
//! [`GitHubHost`]: super::github::GitHubHost

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

/// Boxed future returned by host lookups.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Project-level facts needed before resolving a ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub private: bool,
    pub default_branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file.
    Blob,
    /// A directory.
    Tree,
    /// Submodules and anything else the host reports.
    Other,
}

/// One entry of a revision's file listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Path relative to the project root, `/`-separated, no leading slash.
    pub path: String,
    pub kind: EntryKind,
    /// Host-side content id (the blob sha on GitHub).
    pub id: String,
    /// Size in bytes as reported by the host.
    pub size: u64,
}

/// Full listing of a revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<ListingEntry>,
    /// The host could not return the complete listing.
    pub truncated: bool,
}

/// Lookups the import pipeline needs from a remote host.
///
/// Implementations translate transport failures into the crate's error
/// kinds (`ProjectNotFound`, `RateLimited`, `Unauthorized`,
/// `HostUnreachable`, ...); raw status codes never reach the caller.
pub trait RemoteHost: Send + Sync {
    fn metadata<'a>(&'a self, owner: &'a str, name: &'a str) -> HostFuture<'a, ProjectMetadata>;

    /// Resolve a branch, tag or commit to an exact commit id.
    fn resolve_ref<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        git_ref: &'a str,
    ) -> HostFuture<'a, String>;

    fn listing<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        revision: &'a str,
    ) -> HostFuture<'a, Listing>;

    /// Raw bytes of one blob entry.
    fn content<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        entry: &'a ListingEntry,
    ) -> HostFuture<'a, Vec<u8>>;
}
