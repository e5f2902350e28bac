use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sandcastle::errors::{Result, SandcastleError};
use sandcastle::import::{
    EntryKind, HostFuture, Listing, ListingEntry, ProjectMetadata, RemoteHost,
};

/// Failure a fake host lookup can be told to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFailure {
    NotFound,
    RateLimited,
    Unauthorized,
    Unreachable,
}

impl HostFailure {
    fn to_error(self, what: &str) -> SandcastleError {
        match self {
            HostFailure::NotFound => SandcastleError::ProjectNotFound(what.to_string()),
            HostFailure::RateLimited => SandcastleError::RateLimited,
            HostFailure::Unauthorized => SandcastleError::Unauthorized,
            HostFailure::Unreachable => SandcastleError::HostUnreachable("fake".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct FakeBlob {
    bytes: Vec<u8>,
    delay: Option<Duration>,
    failure: Option<HostFailure>,
}

/// In-memory remote host with a single project revision.
#[derive(Debug)]
pub struct FakeHost {
    pub private: bool,
    pub default_branch: String,
    pub revision: String,
    pub truncated: bool,
    metadata_failure: Option<HostFailure>,
    entries: Vec<ListingEntry>,
    blobs: HashMap<String, FakeBlob>,
    fetched: Mutex<Vec<String>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            private: false,
            default_branch: "main".to_string(),
            revision: "0123456789abcdef0123456789abcdef01234567".to_string(),
            truncated: false,
            metadata_failure: None,
            entries: Vec::new(),
            blobs: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Add a blob entry with the given bytes. Size is the byte length.
    pub fn with_blob(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        self.with_sized_blob(path, bytes, size)
    }

    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.with_blob(path, text.as_bytes().to_vec())
    }

    /// Add a blob whose reported size differs from its content.
    pub fn with_sized_blob(mut self, path: &str, bytes: Vec<u8>, size: u64) -> Self {
        self.entries.push(ListingEntry {
            path: path.to_string(),
            kind: EntryKind::Blob,
            id: format!("blob:{path}"),
            size,
        });
        self.blobs.insert(
            path.to_string(),
            FakeBlob {
                bytes,
                delay: None,
                failure: None,
            },
        );
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.entries.push(ListingEntry {
            path: path.to_string(),
            kind: EntryKind::Tree,
            id: format!("tree:{path}"),
            size: 0,
        });
        self
    }

    /// Delay the content fetch of `path`.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        if let Some(blob) = self.blobs.get_mut(path) {
            blob.delay = Some(delay);
        }
        self
    }

    /// Make the content fetch of `path` fail.
    pub fn with_fetch_failure(mut self, path: &str, failure: HostFailure) -> Self {
        if let Some(blob) = self.blobs.get_mut(path) {
            blob.failure = Some(failure);
        }
        self
    }

    pub fn with_metadata_failure(mut self, failure: HostFailure) -> Self {
        self.metadata_failure = Some(failure);
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// Listing paths whose content was requested, in request order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl RemoteHost for FakeHost {
    fn metadata<'a>(&'a self, owner: &'a str, name: &'a str) -> HostFuture<'a, ProjectMetadata> {
        Box::pin(async move {
            if let Some(failure) = self.metadata_failure {
                return Err(failure.to_error(&format!("{owner}/{name}")));
            }
            Ok(ProjectMetadata {
                private: self.private,
                default_branch: self.default_branch.clone(),
            })
        })
    }

    fn resolve_ref<'a>(
        &'a self,
        _owner: &'a str,
        _name: &'a str,
        _git_ref: &'a str,
    ) -> HostFuture<'a, String> {
        Box::pin(async move { Ok(self.revision.clone()) })
    }

    fn listing<'a>(
        &'a self,
        _owner: &'a str,
        _name: &'a str,
        _revision: &'a str,
    ) -> HostFuture<'a, Listing> {
        Box::pin(async move {
            Ok(Listing {
                entries: self.entries.clone(),
                truncated: self.truncated,
            })
        })
    }

    fn content<'a>(
        &'a self,
        _owner: &'a str,
        _name: &'a str,
        entry: &'a ListingEntry,
    ) -> HostFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.fetched.lock().unwrap().push(entry.path.clone());
            let blob = self
                .blobs
                .get(&entry.path)
                .cloned()
                .ok_or_else(|| SandcastleError::ProjectNotFound(entry.path.clone()))?;
            if let Some(delay) = blob.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(failure) = blob.failure {
                return Err(failure.to_error(&entry.path));
            }
            Ok(blob.bytes)
        })
    }
}
