#![allow(dead_code)]

use std::time::Duration;

use sandcastle::config::{ConfigFile, ExecutionConfig, ImportConfig, RawConfigFile};
use sandcastle::types::{FileRecord, ProjectState};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn boot_timeout(mut self, value: &str) -> Self {
        self.config.execution.boot_timeout = value.to_string();
        self
    }

    pub fn command_timeout(mut self, value: &str) -> Self {
        self.config.execution.command_timeout = value.to_string();
        self
    }

    pub fn stop_grace(mut self, value: &str) -> Self {
        self.config.execution.stop_grace = value.to_string();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.import.workers = n;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.import.max_files = n;
        self
    }

    pub fn max_total_bytes(mut self, n: u64) -> Self {
        self.config.import.max_total_bytes = n;
        self
    }

    pub fn max_listing_entries(mut self, n: usize) -> Self {
        self.config.import.max_listing_entries = n;
        self
    }

    pub fn history_limit(mut self, n: usize) -> Self {
        self.config.persistence.history_limit = n;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution settings with short deadlines for controller tests.
pub fn fast_execution_config() -> ExecutionConfig {
    ExecutionConfig {
        boot_timeout: Duration::from_secs(1),
        command_timeout: Duration::from_secs(5),
        stop_grace: Duration::from_millis(200),
        ..ExecutionConfig::default()
    }
}

/// Import settings with the given worker count and defaults elsewhere.
pub fn import_config(workers: usize) -> ImportConfig {
    ImportConfig {
        workers,
        ..ImportConfig::default()
    }
}

/// Builder for `ProjectState`.
#[derive(Default)]
pub struct ProjectStateBuilder {
    records: Vec<FileRecord>,
}

impl ProjectStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.records
            .push(FileRecord::file(path, content).expect("valid test path"));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.records
            .push(FileRecord::directory(path).expect("valid test path"));
        self
    }

    pub fn build(self) -> ProjectState {
        ProjectState::from_records(self.records)
    }
}
