use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One physical occurrence of a record: source path plus 1-based line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub file_path: String,
    pub line_number: u64,
}

/// Group key (formatted key value or content hash) to ordered locations.
pub type DuplicateGroups = BTreeMap<String, Vec<LocationInfo>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderDetail {
    pub processed_size_bytes: u64,
    pub total_size_bytes: u64,
    pub files_processed: u64,
    pub total_files: u64,
    pub keys_found: u64,
    pub rows_processed: u64,
}

impl FolderDetail {
    pub fn average_rows_per_file(&self) -> f64 {
        if self.files_processed == 0 {
            return 0.0;
        }
        self.rows_processed as f64 / self.files_processed as f64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub is_validation_report: bool,
    pub is_partial_report: bool,
    pub files_processed: u64,
    pub total_files: u64,
    pub processed_data_size_bytes: u64,
    pub total_data_size_overall_bytes: u64,
    pub processed_data_size_human: String,
    pub total_data_size_overall_human: String,
    pub total_elapsed_time: String,
    #[serde(default)]
    pub total_elapsed_ms: u64,
    pub total_rows_processed: u64,
    pub unique_key: String,
    pub total_key_occurrences: u64,
    pub unique_keys_duplicated: u64,
    pub duplicate_row_instances: u64,
    pub average_rows_per_file: f64,
    pub average_files_per_folder: f64,
    #[serde(rename = "duplicateIDsPerFolder", default)]
    pub duplicate_ids_per_folder: BTreeMap<String, u64>,
    #[serde(default)]
    pub duplicate_rows_per_folder: BTreeMap<String, u64>,
    #[serde(default)]
    pub folder_details: BTreeMap<String, FolderDetail>,
}

/// Frozen result of one `run`. Built once, never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub summary: Summary,
    #[serde(default)]
    pub duplicate_ids: DuplicateGroups,
    #[serde(default)]
    pub duplicate_rows: DuplicateGroups,
}

impl Report {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("could not serialize report to json")
    }
}

pub fn load_report(path: impl AsRef<Path>) -> Result<Report> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    let report: Report = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report)
}

/// Binary-unit size string: `512 B`, `1.5 KiB`, `3.0 GiB`.
pub fn human_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}iB", bytes as f64 / div as f64, PREFIXES[exp])
}

/// Whole-second duration in `1h2m3s` form; zero components before the first
/// non-zero one are omitted.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = (elapsed.as_millis() + 500) / 1000;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{format_elapsed, human_size, LocationInfo, Report};

    #[test]
    fn human_size_uses_binary_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn elapsed_rounds_to_seconds() {
        assert_eq!(format_elapsed(Duration::from_millis(400)), "0s");
        assert_eq!(format_elapsed(Duration::from_millis(1600)), "2s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_elapsed(Duration::from_secs(3600 + 61)), "1h1m1s");
    }

    #[test]
    fn json_shape_uses_document_field_names() {
        let mut report = Report::default();
        report.summary.unique_key = "id".to_string();
        report.duplicate_ids.insert(
            "a".to_string(),
            vec![LocationInfo {
                file_path: "/data/x.json".to_string(),
                line_number: 3,
            }],
        );
        let value: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().expect("json")).expect("parse");

        assert!(value.get("summary").is_some());
        assert!(value.get("duplicateRows").is_some());
        assert_eq!(value["duplicateIds"]["a"][0]["filePath"], "/data/x.json");
        assert_eq!(value["duplicateIds"]["a"][0]["lineNumber"], 3);
        assert_eq!(value["summary"]["uniqueKey"], "id");
        assert!(value["summary"].get("duplicateIDsPerFolder").is_some());
        assert!(value["summary"].get("isPartialReport").is_some());
    }
}
