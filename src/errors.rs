// src/errors.rs

//! Crate-wide error type.
//!
//! Every caller-visible failure is one of these variants, with a short
//! message meant to be shown to the user as-is. Transport status codes never
//! leak through; the import layer translates them into the kinds below.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandcastleError {
    // -- execution ---------------------------------------------------------
    #[error("Execution engine did not start within {}s; try again", .0.as_secs())]
    BootTimeout(Duration),

    #[error("Execution engine failed to start: {0}")]
    BootFailed(String),

    #[error("A command is already running; stop it before starting another")]
    BusyExecution,

    #[error("Command cancelled")]
    CancelledByUser,

    #[error("Command timed out after {}s", .0.as_secs())]
    CancelledByTimeout(Duration),

    #[error("Execution engine error: {0}")]
    Engine(String),

    // -- import ------------------------------------------------------------
    #[error("Invalid project reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported host '{0}'; only github.com projects can be imported")]
    UnsupportedHost(String),

    #[error("Could not reach the project host: {0}")]
    HostUnreachable(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project host rate limit reached; wait a few minutes and retry")]
    RateLimited,

    #[error("Project host refused access; the project may require sign-in")]
    Unauthorized,

    #[error("Private projects cannot be imported")]
    PrivateUnsupported,

    #[error("Project is too large to import ({0})")]
    ArchiveTooLargeOrTruncated(String),

    #[error("No importable text files found in the project")]
    NoImportableContent,

    #[error("Invalid project file: {0}")]
    InvalidProjectFile(String),

    // -- data model / persistence -----------------------------------------
    #[error("Invalid path '{0}': paths must start with '/' and must not contain '..'")]
    InvalidPath(String),

    #[error("Stored project data for '{0}' is unreadable")]
    CorruptPersistedState(String),

    #[error("Could not write '{key}' to storage: {reason}")]
    StorageWriteFailure { key: String, reason: String },

    // -- ambient -------------------------------------------------------------
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SandcastleError>;
