// src/transfer.rs

//! Project files: exporting a project as JSON or a zip archive, and reading
//! a JSON export back.

use std::io::{Cursor, Write};

use serde_json::Value;
use tracing::debug;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::errors::{Result, SandcastleError};
use crate::types::{FileRecord, ProjectState};

/// Pretty-printed JSON array of the project's records.
pub fn export_project(state: &ProjectState) -> Result<String> {
    serde_json::to_string_pretty(state)
        .map_err(|e| SandcastleError::Other(anyhow::Error::from(e)))
}

/// Zip archive of the project's files, DEFLATE-compressed, with entry
/// names relative to the project root. Directory records are left out.
pub fn export_project_zip(state: &ProjectState, name: &str) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(6));

    for record in state.files() {
        zip.start_file(record.path.trim_start_matches('/'), options)
            .map_err(zip_error)?;
        zip.write_all(record.text().as_bytes())?;
    }
    zip.set_comment(format!("{name} export"));

    let archive = zip.finish().map_err(zip_error)?.into_inner();
    debug!(files = state.files().count(), bytes = archive.len(), "project zipped");
    Ok(archive)
}

fn zip_error(e: zip::result::ZipError) -> SandcastleError {
    SandcastleError::Other(anyhow::Error::from(e))
}

/// Parse a project file leniently.
///
/// Items that are not objects, not of type `"file"`, or lack a string
/// `path` are skipped, as are paths with `..`. A missing leading `/` is
/// added and non-string content becomes empty.
pub fn import_project(text: &str) -> Result<ProjectState> {
    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| SandcastleError::InvalidProjectFile(format!("not valid JSON: {e}")))?;
    let Value::Array(items) = parsed else {
        return Err(SandcastleError::InvalidProjectFile(
            "expected an array of files".to_string(),
        ));
    };

    let total = items.len();
    let mut records = Vec::new();
    for item in items {
        let Value::Object(map) = item else { continue };
        if map.get("type").and_then(Value::as_str) != Some("file") {
            continue;
        }
        let Some(raw_path) = map.get("path").and_then(Value::as_str) else {
            continue;
        };
        let Some(path) = sanitize_path(raw_path) else {
            continue;
        };
        let content = map.get("content").and_then(Value::as_str).unwrap_or("");
        if let Ok(record) = FileRecord::file(path, content) {
            records.push(record);
        }
    }

    debug!(items = total, files = records.len(), "parsed project file");
    if records.is_empty() {
        return Err(SandcastleError::NoImportableContent);
    }
    Ok(ProjectState::from_records(records))
}

fn sanitize_path(raw: &str) -> Option<String> {
    let path = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    };
    if path.contains("..") {
        return None;
    }
    Some(path)
}
