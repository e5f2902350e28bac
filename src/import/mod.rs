// src/import/mod.rs

//! Remote project import.
//!
//! [`ImportPipeline::import`] turns a reference string into a
//! [`ProjectState`]:
//!
//! 1. parse the reference ([`reference`])
//! 2. reject private projects and resolve the ref to a commit ([`host`])
//! 3. list the revision and reject truncated or oversized listings
//! 4. map listing paths onto project paths ([`paths`])
//! 5. apply the binary denylist and the caps ([`admission`])
//! 6. fetch admitted entries on a worker pool, in order ([`fetch`])
//! 7. keep payloads that decode as UTF-8
//!
//! Entries dropped along the way are reported in
//! [`ImportOutcome::skipped`]; only an empty result fails the import.

pub mod admission;
pub mod fetch;
pub mod github;
pub mod host;
pub mod paths;
pub mod reference;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::errors::{Result, SandcastleError};
use crate::types::{FileRecord, ProjectState};

pub use admission::{Admission, AdmissionFilter, Candidate, Rejection};
pub use fetch::fetch_in_order;
pub use github::GitHubHost;
pub use host::{EntryKind, HostFuture, Listing, ListingEntry, ProjectMetadata, RemoteHost};
pub use paths::{PathRejection, normalize_entry_path};
pub use reference::ProjectReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    Binary,
    TooLarge,
    FileCountCap,
    ByteCap,
    FetchFailed,
    NotText,
    UnsafePath,
    VcsMetadata,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Binary => "binary file",
            SkipReason::TooLarge => "file too large",
            SkipReason::FileCountCap => "file count limit reached",
            SkipReason::ByteCap => "total size limit reached",
            SkipReason::FetchFailed => "download failed",
            SkipReason::NotText => "not valid text",
            SkipReason::UnsafePath => "unsafe path",
            SkipReason::VcsMetadata => "version control metadata",
        };
        f.write_str(s)
    }
}

impl From<Rejection> for SkipReason {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::Binary => SkipReason::Binary,
            Rejection::TooLarge => SkipReason::TooLarge,
            Rejection::FileCountCap => SkipReason::FileCountCap,
            Rejection::ByteCap => SkipReason::ByteCap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Listing path as the host reported it.
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub state: ProjectState,
    /// Exact commit the files were read from.
    pub revision: String,
    pub skipped: Vec<SkippedEntry>,
}

pub struct ImportPipeline {
    host: Arc<dyn RemoteHost>,
    config: ImportConfig,
    filter: AdmissionFilter,
}

impl ImportPipeline {
    pub fn new(host: Arc<dyn RemoteHost>, config: ImportConfig) -> Result<Self> {
        let filter = AdmissionFilter::new(config.limits.clone())?;
        Ok(Self {
            host,
            config,
            filter,
        })
    }

    /// Pipeline backed by the GitHub REST API at `config.api_base`.
    pub fn github(config: ImportConfig) -> Result<Self> {
        let host = GitHubHost::from_config(&config)?;
        Self::new(Arc::new(host), config)
    }

    pub async fn import(&self, input: &str) -> Result<ImportOutcome> {
        let reference = ProjectReference::parse(input)?;
        let slug = reference.slug();
        info!(
            project = %slug,
            git_ref = ?reference.git_ref,
            subpath = ?reference.subpath,
            file = ?reference.file,
            "importing project"
        );

        let metadata = self.host.metadata(&reference.owner, &reference.name).await?;
        if metadata.private {
            return Err(SandcastleError::PrivateUnsupported);
        }

        let git_ref = reference
            .git_ref
            .clone()
            .unwrap_or_else(|| metadata.default_branch.clone());
        let revision = self
            .host
            .resolve_ref(&reference.owner, &reference.name, &git_ref)
            .await?;
        debug!(project = %slug, git_ref = %git_ref, revision = %revision, "resolved ref");

        let listing = self
            .host
            .listing(&reference.owner, &reference.name, &revision)
            .await?;
        if listing.truncated {
            return Err(SandcastleError::ArchiveTooLargeOrTruncated(
                "the host returned an incomplete file listing".to_string(),
            ));
        }
        if listing.entries.len() > self.config.max_listing_entries {
            return Err(SandcastleError::ArchiveTooLargeOrTruncated(format!(
                "{} entries, limit is {}",
                listing.entries.len(),
                self.config.max_listing_entries
            )));
        }

        let mut skipped = Vec::new();
        let candidates = self.candidates(listing, &reference, &mut skipped);

        let admission = self.filter.admit(candidates);
        for (candidate, rejection) in admission.rejected {
            skipped.push(SkippedEntry {
                path: candidate.entry.path,
                reason: rejection.into(),
            });
        }
        debug!(
            project = %slug,
            admitted = admission.admitted.len(),
            skipped = skipped.len(),
            "admission complete"
        );

        let admitted = admission.admitted;
        let payloads = self
            .fetch_all(&reference, admitted.clone())
            .await;

        let mut state = ProjectState::new();
        for (candidate, payload) in admitted.into_iter().zip(payloads) {
            let bytes = match payload {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    debug!(path = %candidate.entry.path, error = %err, "fetch failed; skipping");
                    skipped.push(SkippedEntry {
                        path: candidate.entry.path,
                        reason: SkipReason::FetchFailed,
                    });
                    continue;
                }
                None => {
                    skipped.push(SkippedEntry {
                        path: candidate.entry.path,
                        reason: SkipReason::FetchFailed,
                    });
                    continue;
                }
            };

            match String::from_utf8(bytes) {
                Ok(text) => state.upsert(FileRecord::file(candidate.path, text)?),
                Err(_) => skipped.push(SkippedEntry {
                    path: candidate.entry.path,
                    reason: SkipReason::NotText,
                }),
            }
        }

        if state.is_empty() {
            warn!(project = %slug, skipped = skipped.len(), "no importable files");
            return Err(SandcastleError::NoImportableContent);
        }

        info!(
            project = %slug,
            revision = %revision,
            files = state.len(),
            skipped = skipped.len(),
            "import complete"
        );

        Ok(ImportOutcome {
            state,
            revision,
            skipped,
        })
    }

    /// Blob entries mapped onto project paths, in listing order.
    fn candidates(
        &self,
        listing: Listing,
        reference: &ProjectReference,
        skipped: &mut Vec<SkippedEntry>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for entry in listing.entries {
            if entry.kind != EntryKind::Blob {
                continue;
            }
            if reference.file.as_ref().is_some_and(|file| *file != entry.path) {
                continue;
            }
            match normalize_entry_path(&entry.path, reference.subpath.as_deref()) {
                Ok(path) => out.push(Candidate { path, entry }),
                Err(PathRejection::OutsideWrapper) => {}
                Err(PathRejection::UnsafePath) => skipped.push(SkippedEntry {
                    path: entry.path,
                    reason: SkipReason::UnsafePath,
                }),
                Err(PathRejection::VcsMetadata) => skipped.push(SkippedEntry {
                    path: entry.path,
                    reason: SkipReason::VcsMetadata,
                }),
            }
        }
        out
    }

    async fn fetch_all(
        &self,
        reference: &ProjectReference,
        admitted: Vec<Candidate>,
    ) -> Vec<Option<std::result::Result<Vec<u8>, String>>> {
        let host = Arc::clone(&self.host);
        let owner = Arc::<str>::from(reference.owner.as_str());
        let name = Arc::<str>::from(reference.name.as_str());

        fetch_in_order(admitted, self.config.workers, move |_, candidate: Candidate| {
            let host = Arc::clone(&host);
            let owner = Arc::clone(&owner);
            let name = Arc::clone(&name);
            async move {
                let result = host
                    .content(&owner, &name, &candidate.entry)
                    .await
                    .map_err(|e| e.to_string());
                Some(result)
            }
        })
        .await
    }
}
