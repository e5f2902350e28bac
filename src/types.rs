// src/types.rs

//! Shared data model: file records, project states and snapshots.
//!
//! The same [`FileRecord`] shape flows through every part of the crate: the
//! import pipeline produces it, the execution controller materializes it and
//! the persistence store serializes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SandcastleError};

/// Kind of a project entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// A single entry of a project.
///
/// `path` is always absolute ("/"-rooted) and never contains a `..`
/// segment. `content` is present only for files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileRecord {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self {
            path,
            kind: FileKind::File,
            content: Some(content.into()),
        })
    }

    pub fn directory(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self {
            path,
            kind: FileKind::Directory,
            content: None,
        })
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// File content, or the empty string for directories and content-less
    /// files.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Check that `path` follows the internal absolute convention.
pub fn validate_path(path: &str) -> Result<()> {
    let valid = path.starts_with('/')
        && path.len() > 1
        && !path.split('/').any(|segment| segment == "..");
    if valid {
        Ok(())
    } else {
        Err(SandcastleError::InvalidPath(path.to_string()))
    }
}

/// A complete set of file records with unique paths.
///
/// Records are kept sorted by path so that two content-equal states always
/// serialize to the same text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FileRecord>", into = "Vec<FileRecord>")]
pub struct ProjectState {
    records: Vec<FileRecord>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from records; when a path repeats, the last record
    /// for it wins.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut state = Self::new();
        for record in records {
            state.upsert(record);
        }
        state
    }

    /// Insert or replace the record at `record.path`.
    pub fn upsert(&mut self, record: FileRecord) {
        match self
            .records
            .binary_search_by(|r| r.path.as_str().cmp(&record.path))
        {
            Ok(idx) => self.records[idx] = record,
            Err(idx) => self.records.insert(idx, record),
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.records
            .binary_search_by(|r| r.path.as_str().cmp(path))
            .ok()
            .map(|idx| self.records.remove(idx))
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records
            .binary_search_by(|r| r.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.records[idx])
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter().filter(|r| r.is_file())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Canonical JSON form used for persistence and snapshot comparison.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SandcastleError::Other(anyhow::Error::from(e)))
    }

    /// Project used when nothing has been persisted yet.
    pub fn sample() -> Self {
        let package_json = concat!(
            "{\n",
            "  \"name\": \"sample-project\",\n",
            "  \"version\": \"1.0.0\",\n",
            "  \"private\": true,\n",
            "  \"scripts\": {\n",
            "    \"start\": \"node index.js\"\n",
            "  }\n",
            "}"
        );
        let records = [
            ("/package.json", package_json),
            ("/index.js", "console.log('sandcastle workspace ready');\n"),
        ]
        .into_iter()
        .map(|(path, content)| FileRecord {
            path: path.to_string(),
            kind: FileKind::File,
            content: Some(content.to_string()),
        });
        Self::from_records(records)
    }
}

impl TryFrom<Vec<FileRecord>> for ProjectState {
    type Error = SandcastleError;

    fn try_from(records: Vec<FileRecord>) -> std::result::Result<Self, Self::Error> {
        for record in &records {
            validate_path(&record.path)?;
        }
        Ok(Self::from_records(records))
    }
}

impl From<ProjectState> for Vec<FileRecord> {
    fn from(state: ProjectState) -> Self {
        state.records
    }
}

/// One timestamped, immutable copy of a project state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// blake3 digest of the serialized state.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub state: ProjectState,
}

impl Snapshot {
    /// Create a snapshot from a state and its canonical serialization.
    pub fn new(state: ProjectState, serialized: &str) -> Self {
        Self {
            id: blake3::hash(serialized.as_bytes()).to_hex().to_string(),
            timestamp: Utc::now(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_and_parent_paths() {
        assert!(validate_path("/src/main.js").is_ok());
        assert!(validate_path("src/main.js").is_err());
        assert!(validate_path("/src/../etc/passwd").is_err());
        assert!(validate_path("/").is_err());
        // ".." only matters as a whole segment.
        assert!(validate_path("/notes..md").is_ok());
    }

    #[test]
    fn last_record_for_a_path_wins_and_order_is_canonical() {
        let state = ProjectState::from_records([
            FileRecord::file("/b.js", "b").unwrap(),
            FileRecord::file("/a.js", "old").unwrap(),
            FileRecord::file("/a.js", "new").unwrap(),
        ]);

        let paths: Vec<_> = state.paths().collect();
        assert_eq!(paths, vec!["/a.js", "/b.js"]);
        assert_eq!(state.get("/a.js").unwrap().text(), "new");
    }

    #[test]
    fn serializes_with_type_field_and_omits_directory_content() {
        let state = ProjectState::from_records([
            FileRecord::directory("/src").unwrap(),
            FileRecord::file("/src/x.js", "1").unwrap(),
        ]);
        let json = state.to_json().unwrap();
        assert_eq!(
            json,
            r#"[{"path":"/src","type":"directory"},{"path":"/src/x.js","type":"file","content":"1"}]"#
        );

        let back: ProjectState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn deserialize_rejects_unsafe_paths() {
        let json = r#"[{"path":"/../x","type":"file","content":""}]"#;
        assert!(serde_json::from_str::<ProjectState>(json).is_err());
    }

    #[test]
    fn snapshot_id_depends_only_on_content() {
        let state = ProjectState::sample();
        let json = state.to_json().unwrap();
        let a = Snapshot::new(state.clone(), &json);
        let b = Snapshot::new(state, &json);
        assert_eq!(a.id, b.id);
    }
}
