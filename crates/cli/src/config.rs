use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dupe_analyser_core::{KeyFormat, RenderOptions, ReportOutputs, DEFAULT_WORKERS};
use dupe_analyser_service::JobRequest;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "dupe-analyser.json";

/// Settings file contents. Command-line flags override individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Comma-separated roots.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_true")]
    pub check_key: bool,
    #[serde(default)]
    pub check_row: bool,
    #[serde(default = "default_true")]
    pub show_folder_breakdown: bool,
    #[serde(default = "default_true")]
    pub output_txt: bool,
    #[serde(default)]
    pub output_json: bool,
    #[serde(default)]
    pub key_format: KeyFormat,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub object_store_dir: Option<PathBuf>,
}

fn default_key() -> String {
    "id".to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            key: default_key(),
            workers: default_workers(),
            log_path: default_log_path(),
            check_key: true,
            check_row: false,
            show_folder_breakdown: true,
            output_txt: true,
            output_json: false,
            key_format: KeyFormat::default(),
            excludes: Vec::new(),
            object_store_dir: None,
        }
    }
}

impl AppConfig {
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn roots(&self) -> Vec<String> {
        self.path
            .split(',')
            .map(str::trim)
            .filter(|root| !root.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn job_request(&self, validate_only: bool) -> JobRequest {
        JobRequest {
            job_id: None,
            paths: self.roots(),
            key: self.key.clone(),
            workers: self.workers,
            check_key: self.check_key,
            check_row: self.check_row,
            validate_only,
            key_format: self.key_format,
            excludes: self.excludes.clone(),
            object_store_dir: self.object_store_dir.clone(),
        }
    }

    pub fn render_options(&self, full: bool) -> RenderOptions {
        RenderOptions {
            full,
            check_key: self.check_key,
            check_row: self.check_row,
            show_folder_breakdown: self.show_folder_breakdown,
        }
    }

    pub fn outputs(&self) -> ReportOutputs {
        ReportOutputs {
            txt: self.output_txt,
            json: self.output_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::AppConfig;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let config = AppConfig::load(&temp.path().join("absent.json")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.workers, 8);
        assert!(config.output_txt);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("cfg.json");
        fs::write(&path, r#"{"path":" /a , ,gs://b/p ","check_row":true,"key_format":"typed"}"#)
            .expect("write");

        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.roots(), vec!["/a".to_string(), "gs://b/p".to_string()]);
        assert!(config.check_row);
        assert!(config.check_key);
        assert_eq!(config.key, "id");

        let request = config.job_request(false);
        assert_eq!(request.paths.len(), 2);
        assert!(request.check_row);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("cfg.json");
        fs::write(&path, "{ not json").expect("write");
        assert!(AppConfig::load(&path).is_err());
    }
}
