// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::import::github::DEFAULT_API_BASE;

/// Extensions never fetched during import (compared case-insensitively).
pub const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "avif",
    // archives
    "zip", "gz", "tgz", "bz2", "xz", "7z", "rar", "tar", "jar", "war",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // media
    "mp3", "mp4", "wav", "ogg", "flac", "mov", "avi", "webm", "mkv",
    // compiled / executable
    "exe", "dll", "so", "dylib", "o", "a", "class", "pyc", "wasm", "bin",
    // documents and databases
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "sqlite", "db",
];

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [execution]
/// boot_timeout = "20s"
/// command_timeout = "120s"
///
/// [import]
/// workers = 8
/// max_files = 500
///
/// [persistence]
/// data_dir = ".sandcastle/data"
/// history_limit = 10
/// ```
///
/// All sections are optional and have reasonable defaults. Durations stay
/// strings here; [`ConfigFile`] is the validated, typed form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub execution: RawExecutionSection,

    #[serde(default)]
    pub import: RawImportSection,

    #[serde(default)]
    pub persistence: RawPersistenceSection,
}

/// `[execution]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawExecutionSection {
    #[serde(default = "default_boot_timeout")]
    pub boot_timeout: String,

    /// Timeout applied to `run` when the caller gives none.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    /// How long `stop` waits for the engine to settle.
    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,

    /// Directory the process engine materializes files into.
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: PathBuf,
}

fn default_boot_timeout() -> String {
    "20s".to_string()
}

fn default_command_timeout() -> String {
    "120s".to_string()
}

fn default_stop_grace() -> String {
    "2s".to_string()
}

fn default_sandbox_dir() -> PathBuf {
    PathBuf::from(".sandcastle/sandbox")
}

impl Default for RawExecutionSection {
    fn default() -> Self {
        Self {
            boot_timeout: default_boot_timeout(),
            command_timeout: default_command_timeout(),
            stop_grace: default_stop_grace(),
            sandbox_dir: default_sandbox_dir(),
        }
    }
}

/// `[import]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawImportSection {
    /// Base URL of the GitHub REST API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,

    #[serde(default = "default_max_listing_entries")]
    pub max_listing_entries: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Replaces [`DEFAULT_BINARY_EXTENSIONS`] when given.
    #[serde(default)]
    pub binary_extensions: Option<Vec<String>>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_workers() -> usize {
    8
}

fn default_max_files() -> usize {
    500
}

fn default_max_file_bytes() -> u64 {
    1_000_000
}

fn default_max_total_bytes() -> u64 {
    20_000_000
}

fn default_max_listing_entries() -> usize {
    20_000
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for RawImportSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            workers: default_workers(),
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            max_listing_entries: default_max_listing_entries(),
            request_timeout: default_request_timeout(),
            binary_extensions: None,
        }
    }
}

/// `[persistence]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPersistenceSection {
    /// Directory of the durable backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory of the fallback backend.
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".sandcastle/data")
}

fn default_fallback_dir() -> PathBuf {
    PathBuf::from(".sandcastle/fallback")
}

fn default_history_limit() -> usize {
    10
}

impl Default for RawPersistenceSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            fallback_dir: default_fallback_dir(),
            history_limit: default_history_limit(),
        }
    }
}

/// Validated configuration. Build it from a [`RawConfigFile`] with
/// `ConfigFile::try_from`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub execution: ExecutionConfig,
    pub import: ImportConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub boot_timeout: Duration,
    pub command_timeout: Duration,
    pub stop_grace: Duration,
    pub sandbox_dir: PathBuf,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            boot_timeout: Duration::from_secs(20),
            command_timeout: Duration::from_secs(120),
            stop_grace: Duration::from_secs(2),
            sandbox_dir: default_sandbox_dir(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub api_base: String,
    pub workers: usize,
    pub request_timeout: Duration,
    pub max_listing_entries: usize,
    pub limits: AdmissionLimits,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            workers: default_workers(),
            request_timeout: Duration::from_secs(30),
            max_listing_entries: default_max_listing_entries(),
            limits: AdmissionLimits::default(),
        }
    }
}

/// Caps applied by the admission filter before any content is fetched.
#[derive(Debug, Clone)]
pub struct AdmissionLimits {
    pub max_files: usize,
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    /// Lower-case extensions without the leading dot.
    pub binary_extensions: Vec<String>,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            binary_extensions: DEFAULT_BINARY_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub fallback_dir: PathBuf,
    pub history_limit: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            fallback_dir: default_fallback_dir(),
            history_limit: default_history_limit(),
        }
    }
}
