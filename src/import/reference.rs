// src/import/reference.rs

//! Parsing of user-supplied remote project references.
//!
//! Accepted forms (scheme optional):
//!
//! - `github.com/<owner>/<name>`
//! - `github.com/<owner>/<name>/tree/<ref>/<subpath>`
//! - `github.com/<owner>/<name>/blob/<ref>/<file>` (that one file only)
//! - `github.com/<owner>/<name>?ref=<ref>&path=<subpath>`
//! - `github.com/<owner>/<name>#<ref>`
//!
//! When several conventions carry a ref, the path form wins over the query
//! form, which wins over the fragment.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use crate::errors::{Result, SandcastleError};

/// The only host projects can be imported from.
pub const SUPPORTED_HOST: &str = "github.com";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex is valid")
});

/// A validated reference to a remote project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReference {
    pub owner: String,
    pub name: String,
    /// Branch, tag or commit; `None` means the default branch.
    pub git_ref: Option<String>,
    /// Directory inside the project to import, without surrounding slashes.
    /// Stripped from every imported path.
    pub subpath: Option<String>,
    /// Single file selected by a `blob/` reference, relative to the project
    /// root. Its parent directory is the `subpath`.
    pub file: Option<String>,
}

impl ProjectReference {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let url = parse_url(trimmed)?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid("reference has no host"))?;
        let host = host.strip_prefix("www.").unwrap_or(host);
        if host != SUPPORTED_HOST {
            return Err(SandcastleError::UnsupportedHost(host.to_string()));
        }

        let segments: Vec<String> = url
            .path_segments()
            .map(|parts| {
                parts
                    .filter(|s| !s.is_empty())
                    .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        if segments.len() < 2 {
            return Err(invalid("expected github.com/<owner>/<name>"));
        }

        let owner = segments[0].clone();
        let name = segments[1].trim_end_matches(".git").to_string();
        for part in [&owner, &name] {
            if !NAME_RE.is_match(part) || part == "." || part == ".." {
                return Err(invalid(&format!("'{part}' is not a valid owner or project name")));
            }
        }

        let mut git_ref = None;
        let mut subpath = None;
        let mut file = None;

        match segments.get(2).map(String::as_str) {
            None => {}
            Some(kind @ ("tree" | "blob")) => {
                let r = segments
                    .get(3)
                    .ok_or_else(|| invalid(&format!("missing ref after /{kind}/")))?;
                git_ref = Some(r.clone());
                let rest = segments[4..].join("/");
                if kind == "tree" {
                    subpath = Some(rest);
                } else {
                    file = Some(
                        normalize_subpath(&rest)?
                            .ok_or_else(|| invalid("missing file path after /blob/<ref>/"))?,
                    );
                }
            }
            Some(other) => {
                return Err(invalid(&format!("unsupported path segment '{other}'")));
            }
        }

        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "ref" | "branch" if git_ref.is_none() => git_ref = Some(value.into_owned()),
                "path" if subpath.is_none() && file.is_none() => subpath = Some(value.into_owned()),
                _ => {}
            }
        }

        if git_ref.is_none() {
            git_ref = url
                .fragment()
                .map(|f| percent_decode_str(f).decode_utf8_lossy().into_owned())
                .filter(|f| !f.is_empty());
        }

        let subpath = match (&file, subpath) {
            (Some(file), _) => file.rsplit_once('/').map(|(parent, _)| parent.to_string()),
            (None, Some(raw)) => normalize_subpath(&raw)?,
            (None, None) => None,
        };

        Ok(Self {
            owner,
            name,
            git_ref,
            subpath,
            file,
        })
    }

    /// `owner/name`, used in messages and logs.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

fn invalid(msg: &str) -> SandcastleError {
    SandcastleError::InvalidReference(msg.to_string())
}

/// Parse `input` as a URL, assuming `https://` when no scheme is given.
/// `http` is upgraded.
fn parse_url(input: &str) -> Result<Url> {
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };
    let url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(&format!("unsupported scheme '{other}'"))),
    }
}

fn normalize_subpath(raw: &str) -> Result<Option<String>> {
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.iter().any(|s| *s == "..") {
        return Err(invalid("subpath must not contain '..'"));
    }
    if segments.is_empty() {
        return Ok(None);
    }
    Ok(Some(segments.join("/")))
}
