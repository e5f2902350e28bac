// src/import/github.rs

//! GitHub REST transport for the import pipeline.
//!
//! Uses the listing + per-blob transport:
//!
//! - `GET /repos/{owner}/{name}`                          metadata
//! - `GET /repos/{owner}/{name}/commits/{ref}`            ref → commit
//! - `GET /repos/{owner}/{name}/git/trees/{sha}?recursive=1`  listing
//! - `GET /repos/{owner}/{name}/git/blobs/{sha}`          content

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ImportConfig;
use crate::errors::{Result, SandcastleError};
use crate::import::host::{
    EntryKind, HostFuture, Listing, ListingEntry, ProjectMetadata, RemoteHost,
};

/// Public GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct GitHubHost {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    #[serde(default)]
    private: bool,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

impl GitHubHost {
    pub fn new(api_base: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("sandcastle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SandcastleError::HostUnreachable(format!("creating HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &ImportConfig) -> Result<Self> {
        Self::new(cfg.api_base.clone(), cfg.request_timeout)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        debug!(url = %url, "GET");

        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| unreachable_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "host returned an error status");
            return Err(map_status(status, resp.headers(), what));
        }

        resp.json::<T>().await.map_err(|e| {
            SandcastleError::HostUnreachable(format!("unexpected response while reading {what}: {e}"))
        })
    }
}

impl RemoteHost for GitHubHost {
    fn metadata<'a>(&'a self, owner: &'a str, name: &'a str) -> HostFuture<'a, ProjectMetadata> {
        Box::pin(async move {
            let what = format!("{owner}/{name}");
            let repo: RepoResponse = self.get_json(&format!("/repos/{owner}/{name}"), &what).await?;
            Ok(ProjectMetadata {
                private: repo.private,
                default_branch: repo
                    .default_branch
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| "main".to_string()),
            })
        })
    }

    fn resolve_ref<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        git_ref: &'a str,
    ) -> HostFuture<'a, String> {
        Box::pin(async move {
            let what = format!("ref '{git_ref}' in {owner}/{name}");
            let path = format!(
                "/repos/{owner}/{name}/commits/{}",
                utf8_percent_encode(git_ref, REF_ESCAPES)
            );
            let commit: CommitResponse = self.get_json(&path, &what).await?;
            Ok(commit.sha)
        })
    }

    fn listing<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        revision: &'a str,
    ) -> HostFuture<'a, Listing> {
        Box::pin(async move {
            let what = format!("file listing of {owner}/{name}@{revision}");
            let path = format!("/repos/{owner}/{name}/git/trees/{revision}?recursive=1");
            let tree: TreeResponse = self.get_json(&path, &what).await?;
            let entries = tree
                .tree
                .into_iter()
                .map(|item| ListingEntry {
                    kind: match item.kind.as_str() {
                        "blob" => EntryKind::Blob,
                        "tree" => EntryKind::Tree,
                        _ => EntryKind::Other,
                    },
                    path: item.path,
                    id: item.sha,
                    size: item.size.unwrap_or(0),
                })
                .collect();
            Ok(Listing {
                entries,
                truncated: tree.truncated,
            })
        })
    }

    fn content<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        entry: &'a ListingEntry,
    ) -> HostFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let what = format!("{} in {owner}/{name}", entry.path);
            let path = format!("/repos/{owner}/{name}/git/blobs/{}", entry.id);
            let blob: BlobResponse = self.get_json(&path, &what).await?;
            decode_blob(&blob)
                .map_err(|e| SandcastleError::HostUnreachable(format!("decoding {what}: {e}")))
        })
    }
}

/// Translate a non-success status into an error kind.
pub fn map_status(status: StatusCode, headers: &HeaderMap, what: &str) -> SandcastleError {
    let rate_limit_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status {
        StatusCode::NOT_FOUND => SandcastleError::ProjectNotFound(what.to_string()),
        StatusCode::TOO_MANY_REQUESTS => SandcastleError::RateLimited,
        StatusCode::FORBIDDEN if rate_limit_exhausted => SandcastleError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SandcastleError::Unauthorized,
        _ => SandcastleError::HostUnreachable(format!(
            "the host could not serve {what}; try again later"
        )),
    }
}

fn unreachable_error(e: &reqwest::Error) -> SandcastleError {
    let reason = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    debug!(error = %e, "request to project host failed");
    SandcastleError::HostUnreachable(reason.to_string())
}

fn decode_blob(blob: &BlobResponse) -> std::result::Result<Vec<u8>, String> {
    match blob.encoding.as_str() {
        "base64" => {
            let compact: String = blob.content.split_whitespace().collect();
            BASE64.decode(compact.as_bytes()).map_err(|e| e.to_string())
        }
        "utf-8" | "utf8" | "" => Ok(blob.content.clone().into_bytes()),
        other => Err(format!("unsupported encoding '{other}'")),
    }
}

/// Characters escaped in a ref used as a path suffix. `/` is kept because
/// refs may contain it.
const REF_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_needs_exhausted_header_on_403() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, &headers, "x"),
            SandcastleError::Unauthorized
        ));

        headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, &headers, "x"),
            SandcastleError::RateLimited
        ));
    }

    #[test]
    fn unexpected_statuses_do_not_leak_codes() {
        let err = map_status(StatusCode::BAD_GATEWAY, &HeaderMap::new(), "o/r");
        assert!(matches!(err, SandcastleError::HostUnreachable(_)));
        assert!(!err.to_string().contains("502"));
    }

    #[test]
    fn decodes_wrapped_base64() {
        let blob = BlobResponse {
            content: "aGVs\nbG8=\n".to_string(),
            encoding: "base64".to_string(),
        };
        assert_eq!(decode_blob(&blob).unwrap(), b"hello");
    }

    #[test]
    fn refs_keep_slashes() {
        assert_eq!(
            utf8_percent_encode("feature/new ui", REF_ESCAPES).to_string(),
            "feature/new%20ui"
        );
    }
}
