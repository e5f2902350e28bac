// src/import/admission.rs

//! Admission filter applied to listing entries before any content is fetched.

use anyhow::Context;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::AdmissionLimits;
use crate::errors::Result;
use crate::import::host::ListingEntry;

/// A listing entry whose path already passed normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute project path (`/src/main.js`).
    pub path: String,
    pub entry: ListingEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Binary,
    TooLarge,
    FileCountCap,
    ByteCap,
}

#[derive(Debug, Default)]
pub struct Admission {
    /// Entries to fetch, in listing order.
    pub admitted: Vec<Candidate>,
    pub rejected: Vec<(Candidate, Rejection)>,
}

/// Binary denylist plus the per-file, file-count and cumulative byte caps.
#[derive(Debug, Clone)]
pub struct AdmissionFilter {
    limits: AdmissionLimits,
    binary: GlobSet,
}

impl AdmissionFilter {
    pub fn new(limits: AdmissionLimits) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for ext in &limits.binary_extensions {
            let pattern = format!("**/*.{ext}");
            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid binary extension: {ext}"))?;
            builder.add(glob);
        }
        let binary = builder
            .build()
            .context("building binary extension globset")?;
        Ok(Self { limits, binary })
    }

    pub fn is_binary(&self, path: &str) -> bool {
        self.binary.is_match(path.trim_start_matches('/'))
    }

    /// Split candidates into admitted and rejected, preserving order.
    ///
    /// Once the next admissible entry would exceed the file-count or the
    /// cumulative byte cap, nothing after it is admitted.
    pub fn admit(&self, candidates: Vec<Candidate>) -> Admission {
        let mut out = Admission::default();
        let mut total_bytes: u64 = 0;
        let mut capped: Option<Rejection> = None;

        for candidate in candidates {
            if self.is_binary(&candidate.path) {
                out.rejected.push((candidate, Rejection::Binary));
                continue;
            }
            if candidate.entry.size > self.limits.max_file_bytes {
                out.rejected.push((candidate, Rejection::TooLarge));
                continue;
            }

            if capped.is_none() {
                if out.admitted.len() >= self.limits.max_files {
                    capped = Some(Rejection::FileCountCap);
                } else if total_bytes.saturating_add(candidate.entry.size)
                    > self.limits.max_total_bytes
                {
                    capped = Some(Rejection::ByteCap);
                }
            }

            match capped {
                Some(reason) => out.rejected.push((candidate, reason)),
                None => {
                    total_bytes += candidate.entry.size;
                    out.admitted.push(candidate);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::host::EntryKind;

    fn candidate(path: &str, size: u64) -> Candidate {
        Candidate {
            path: path.to_string(),
            entry: ListingEntry {
                path: path.trim_start_matches('/').to_string(),
                kind: EntryKind::Blob,
                id: format!("sha-{path}"),
                size,
            },
        }
    }

    fn paths(list: &[Candidate]) -> Vec<&str> {
        list.iter().map(|c| c.path.as_str()).collect()
    }

    #[test]
    fn binary_match_is_case_insensitive() {
        let filter = AdmissionFilter::new(AdmissionLimits::default()).unwrap();
        assert!(filter.is_binary("/a.png"));
        assert!(filter.is_binary("/img/Logo.PNG"));
        assert!(!filter.is_binary("/png/readme.md"));
        assert!(!filter.is_binary("/notes.png.txt"));
    }

    #[test]
    fn drops_binary_and_oversized_entries() {
        let filter = AdmissionFilter::new(AdmissionLimits::default()).unwrap();
        let out = filter.admit(vec![
            candidate("/a.png", 10),
            candidate("/big.txt", 2_000_000),
            candidate("/c.txt", 10),
        ]);
        assert_eq!(paths(&out.admitted), ["/c.txt"]);
        assert_eq!(out.rejected[0].1, Rejection::Binary);
        assert_eq!(out.rejected[1].1, Rejection::TooLarge);
    }

    #[test]
    fn file_count_cap_stops_admission() {
        let limits = AdmissionLimits {
            max_files: 2,
            ..AdmissionLimits::default()
        };
        let filter = AdmissionFilter::new(limits).unwrap();
        let out = filter.admit(vec![
            candidate("/1.txt", 1),
            candidate("/2.txt", 1),
            candidate("/3.txt", 1),
            candidate("/4.txt", 1),
        ]);
        assert_eq!(paths(&out.admitted), ["/1.txt", "/2.txt"]);
        assert!(out.rejected.iter().all(|(_, r)| *r == Rejection::FileCountCap));
    }

    #[test]
    fn byte_cap_stops_even_smaller_later_entries() {
        let limits = AdmissionLimits {
            max_total_bytes: 100,
            ..AdmissionLimits::default()
        };
        let filter = AdmissionFilter::new(limits).unwrap();
        let out = filter.admit(vec![
            candidate("/a.txt", 60),
            candidate("/b.txt", 60),
            candidate("/c.txt", 1),
        ]);
        assert_eq!(paths(&out.admitted), ["/a.txt"]);
        assert_eq!(out.rejected.len(), 2);
        assert!(out.rejected.iter().all(|(_, r)| *r == Rejection::ByteCap));
    }
}
