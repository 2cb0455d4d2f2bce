use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::report::{human_size, DuplicateGroups, Report, Summary};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderOptions {
    pub full: bool,
    pub check_key: bool,
    pub check_row: bool,
    pub show_folder_breakdown: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            full: false,
            check_key: true,
            check_row: false,
            show_folder_breakdown: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportOutputs {
    pub txt: bool,
    pub json: bool,
}

impl Default for ReportOutputs {
    fn default() -> Self {
        Self {
            txt: true,
            json: false,
        }
    }
}

pub fn render_text(report: &Report, options: RenderOptions) -> String {
    if report.summary.is_validation_report {
        render_validation(&report.summary, options.show_folder_breakdown)
    } else {
        render_analysis(report, options)
    }
}

fn files_analysed(summary: &Summary) -> String {
    if summary.is_partial_report {
        format!("{} of {}", summary.files_processed, summary.total_files)
    } else {
        summary.files_processed.to_string()
    }
}

fn render_validation(summary: &Summary, show_folder_breakdown: bool) -> String {
    let mut out = String::new();
    out.push_str("--- Key Validation Summary ---\n\n");
    out.push_str(&format!(
        "Key to Find:                  '{}'\nTotal Files Analysed:         {}\nTotal Rows Processed:         {}\nTotal Keys Found:             {}\nTotal Elapsed Time:           {}\n",
        summary.unique_key,
        files_analysed(summary),
        summary.total_rows_processed,
        summary.total_key_occurrences,
        summary.total_elapsed_time
    ));

    if show_folder_breakdown && !summary.folder_details.is_empty() {
        let rows = summary
            .folder_details
            .iter()
            .map(|(folder, detail)| {
                let files = if summary.is_partial_report {
                    format!("{} / {}", detail.files_processed, detail.total_files)
                } else {
                    detail.total_files.to_string()
                };
                vec![
                    folder.clone(),
                    files,
                    detail.rows_processed.to_string(),
                    detail.keys_found.to_string(),
                ]
            })
            .collect::<Vec<_>>();
        out.push_str("\n--- Per-Folder Breakdown ---\n\n");
        out.push_str(&render_table(
            &["Path", "Files Checked", "Rows Processed", "Keys Found"],
            &rows,
        ));
    }
    out
}

fn render_analysis(report: &Report, options: RenderOptions) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    out.push_str("--- Analysis Summary ---\n\n");

    let data_analysed = if summary.is_partial_report {
        format!(
            "{} of {}",
            summary.processed_data_size_human, summary.total_data_size_overall_human
        )
    } else {
        summary.processed_data_size_human.clone()
    };
    out.push_str(&format!(
        "Total Elapsed Time:             {}\nTotal Files Analysed:           {}\nTotal Data Analysed:            {}\nTotal Rows Processed:           {}\nAverage Rows Per File (Global): {:.2}\nAverage Files Per Folder:       {:.2}\n",
        summary.total_elapsed_time,
        files_analysed(summary),
        data_analysed,
        summary.total_rows_processed,
        summary.average_rows_per_file,
        summary.average_files_per_folder
    ));
    if options.check_key {
        out.push_str(&format!(
            "Total Occurrences of '{}':  {}\nUnique '{}'s with Duplicates: {}\n",
            summary.unique_key,
            summary.total_key_occurrences,
            summary.unique_key,
            summary.unique_keys_duplicated
        ));
    }
    if options.check_row {
        out.push_str(&format!(
            "Total Duplicate Row Instances:  {}\n",
            summary.duplicate_row_instances
        ));
    }

    if options.show_folder_breakdown && !summary.folder_details.is_empty() {
        let rows = summary
            .folder_details
            .iter()
            .map(|(folder, detail)| {
                let (data, files) = if summary.is_partial_report {
                    (
                        format!(
                            "{} / {}",
                            human_size(detail.processed_size_bytes),
                            human_size(detail.total_size_bytes)
                        ),
                        format!("{} / {}", detail.files_processed, detail.total_files),
                    )
                } else {
                    (
                        human_size(detail.total_size_bytes),
                        detail.total_files.to_string(),
                    )
                };
                vec![
                    folder.clone(),
                    data,
                    files,
                    format!("{:.2}", detail.average_rows_per_file()),
                    detail.rows_processed.to_string(),
                    detail.keys_found.to_string(),
                    summary
                        .duplicate_ids_per_folder
                        .get(folder)
                        .copied()
                        .unwrap_or(0)
                        .to_string(),
                    summary
                        .duplicate_rows_per_folder
                        .get(folder)
                        .copied()
                        .unwrap_or(0)
                        .to_string(),
                ]
            })
            .collect::<Vec<_>>();
        out.push_str("\n--- Per-Folder Breakdown ---\n\n");
        out.push_str(&render_table(
            &[
                "Path",
                "Data Analysed",
                "Files Analysed",
                "Avg Rows/File",
                "Rows Processed",
                "Keys Found",
                "Duplicate IDs",
                "Duplicate Rows",
            ],
            &rows,
        ));
    }

    if options.full {
        if options.check_key && !report.duplicate_ids.is_empty() {
            out.push_str("\n--- Full Duplicate ID Details ---\n");
            render_groups(&mut out, &report.duplicate_ids, |id, count| {
                format!("ID '{}': {} (appears {} times)", summary.unique_key, id, count)
            });
        }
        if options.check_row && !report.duplicate_rows.is_empty() {
            out.push_str("\n--- Full Duplicate Row Details ---\n");
            render_groups(&mut out, &report.duplicate_rows, |hash, count| {
                format!("Row (Hash: {hash}) found {count} times:")
            });
        }
    }
    out
}

fn render_groups(
    out: &mut String,
    groups: &DuplicateGroups,
    heading: impl Fn(&str, usize) -> String,
) {
    for (key, locations) in groups {
        out.push('\n');
        out.push_str(&heading(key, locations.len()));
        out.push('\n');
        for location in locations {
            out.push_str(&format!(
                "  - File: {}, Row: {}\n",
                location.file_path, location.line_number
            ));
        }
    }
}

/// Left-aligned columns separated by ` | `, each as wide as its widest cell.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.len()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |cells: Vec<&str>| {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ");
        format!("{}\n", line.trim_end())
    };

    let mut out = format_line(headers.to_vec());
    for row in rows {
        out.push_str(&format_line(row.iter().map(String::as_str).collect()));
    }
    out
}

/// Writes the selected outputs as `report-<timestamp>` files inside `dir` and
/// returns that base path (without suffix).
pub fn write_report_files(
    report: &Report,
    dir: impl AsRef<Path>,
    outputs: ReportOutputs,
    options: RenderOptions,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    let base = dir.join(format!(
        "report-{}",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));

    if outputs.txt {
        let summary_path = with_suffix(&base, "_summary.txt");
        let summary = render_text(report, RenderOptions { full: false, ..options });
        fs::write(&summary_path, summary)
            .with_context(|| format!("failed to write {}", summary_path.display()))?;

        let details_path = with_suffix(&base, "_details.txt");
        let details = render_text(report, RenderOptions { full: true, ..options });
        fs::write(&details_path, details)
            .with_context(|| format!("failed to write {}", details_path.display()))?;
    }
    if outputs.json {
        let json_path = with_suffix(&base, ".json");
        fs::write(&json_path, report.to_json_pretty()?)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
    }

    info!("report written to {}", base.display());
    Ok(base)
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{render_table, render_text, write_report_files, RenderOptions, ReportOutputs};
    use crate::report::{FolderDetail, LocationInfo, Report};

    fn sample_report() -> Report {
        let mut report = Report::default();
        report.summary.unique_key = "id".to_string();
        report.summary.files_processed = 1;
        report.summary.total_files = 2;
        report.summary.processed_data_size_human = "10 B".to_string();
        report.summary.total_data_size_overall_human = "20 B".to_string();
        report.summary.total_key_occurrences = 3;
        report.summary.unique_keys_duplicated = 1;
        report.summary.folder_details.insert(
            "/data".to_string(),
            FolderDetail {
                processed_size_bytes: 10,
                total_size_bytes: 20,
                files_processed: 1,
                total_files: 2,
                keys_found: 3,
                rows_processed: 3,
            },
        );
        report.summary.duplicate_ids_per_folder.insert("/data".to_string(), 2);
        report.duplicate_ids.insert(
            "7".to_string(),
            vec![
                LocationInfo {
                    file_path: "/data/a.json".to_string(),
                    line_number: 1,
                },
                LocationInfo {
                    file_path: "/data/a.json".to_string(),
                    line_number: 3,
                },
            ],
        );
        report
    }

    #[test]
    fn partial_report_shows_progress_counts() {
        let mut report = sample_report();
        report.summary.is_partial_report = true;
        let text = render_text(&report, RenderOptions::default());

        assert!(text.contains("--- Analysis Summary ---"));
        assert!(text.contains("Total Files Analysed:           1 of 2"));
        assert!(text.contains("10 B of 20 B"));
        assert!(text.contains("--- Per-Folder Breakdown ---"));
        assert!(text.contains("1 / 2"));
        assert!(!text.contains("Full Duplicate ID Details"));
    }

    #[test]
    fn full_report_lists_locations() {
        let text = render_text(
            &sample_report(),
            RenderOptions {
                full: true,
                ..RenderOptions::default()
            },
        );
        assert!(text.contains("ID 'id': 7 (appears 2 times)"));
        assert!(text.contains("  - File: /data/a.json, Row: 3"));
    }

    #[test]
    fn validation_report_has_its_own_heading() {
        let mut report = sample_report();
        report.summary.is_validation_report = true;
        let text = render_text(&report, RenderOptions::default());
        assert!(text.contains("--- Key Validation Summary ---"));
        assert!(text.contains("Total Keys Found:             3"));
        assert!(text.contains("Files Checked"));
    }

    #[test]
    fn table_columns_align() {
        let table = render_table(
            &["Path", "N"],
            &[vec!["/a/long/path".to_string(), "12".to_string()]],
        );
        assert_eq!(table, "Path         | N\n/a/long/path | 12\n");
    }

    #[test]
    fn writes_selected_outputs() {
        let temp = TempDir::new().expect("tempdir");
        let dir = temp.path().join("logs");
        let base = write_report_files(
            &sample_report(),
            &dir,
            ReportOutputs {
                txt: true,
                json: true,
            },
            RenderOptions::default(),
        )
        .expect("write");

        let name = base
            .file_name()
            .and_then(|n| n.to_str())
            .expect("name")
            .to_string();
        assert!(name.starts_with("report-"));
        assert!(dir.join(format!("{name}_summary.txt")).exists());
        assert!(dir.join(format!("{name}_details.txt")).exists());
        let json = fs::read_to_string(dir.join(format!("{name}.json"))).expect("json");
        assert!(json.contains("\"duplicateIds\""));
    }
}
