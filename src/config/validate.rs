// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    AdmissionLimits, ConfigFile, ExecutionConfig, ImportConfig, PersistenceConfig,
    RawConfigFile, RawExecutionSection, RawImportSection, RawPersistenceSection,
    DEFAULT_BINARY_EXTENSIONS,
};
use crate::errors::{Result, SandcastleError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SandcastleError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        Ok(ConfigFile {
            execution: validate_execution(raw.execution)?,
            import: validate_import(raw.import)?,
            persistence: validate_persistence(raw.persistence)?,
        })
    }
}

fn validate_execution(raw: RawExecutionSection) -> Result<ExecutionConfig> {
    Ok(ExecutionConfig {
        boot_timeout: positive_duration("execution.boot_timeout", &raw.boot_timeout)?,
        command_timeout: positive_duration("execution.command_timeout", &raw.command_timeout)?,
        stop_grace: positive_duration("execution.stop_grace", &raw.stop_grace)?,
        sandbox_dir: raw.sandbox_dir,
    })
}

fn validate_import(raw: RawImportSection) -> Result<ImportConfig> {
    if raw.api_base.trim().is_empty() {
        return Err(SandcastleError::ConfigError(
            "[import].api_base must not be empty".to_string(),
        ));
    }
    at_least_one("import.workers", raw.workers as u64)?;
    at_least_one("import.max_files", raw.max_files as u64)?;
    at_least_one("import.max_file_bytes", raw.max_file_bytes)?;
    at_least_one("import.max_total_bytes", raw.max_total_bytes)?;
    at_least_one("import.max_listing_entries", raw.max_listing_entries as u64)?;

    let binary_extensions = match raw.binary_extensions {
        Some(list) => list
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect(),
        None => DEFAULT_BINARY_EXTENSIONS
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    Ok(ImportConfig {
        api_base: raw.api_base.trim_end_matches('/').to_string(),
        workers: raw.workers,
        request_timeout: positive_duration("import.request_timeout", &raw.request_timeout)?,
        max_listing_entries: raw.max_listing_entries,
        limits: AdmissionLimits {
            max_files: raw.max_files,
            max_file_bytes: raw.max_file_bytes,
            max_total_bytes: raw.max_total_bytes,
            binary_extensions,
        },
    })
}

fn validate_persistence(raw: RawPersistenceSection) -> Result<PersistenceConfig> {
    at_least_one("persistence.history_limit", raw.history_limit as u64)?;
    Ok(PersistenceConfig {
        data_dir: raw.data_dir,
        fallback_dir: raw.fallback_dir,
        history_limit: raw.history_limit,
    })
}

fn at_least_one(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(SandcastleError::ConfigError(format!(
            "{field} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn positive_duration(field: &str, raw: &str) -> Result<Duration> {
    let duration = parse_duration(raw)
        .map_err(|e| SandcastleError::ConfigError(format!("{field}: {e}")))?;
    if duration.is_zero() {
        return Err(SandcastleError::ConfigError(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(duration)
}

/// Parse a duration such as `"500ms"`, `"20s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let scaled = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is out of range"))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled(60),
        "h" => scaled(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
