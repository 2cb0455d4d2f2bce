use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::report::{DuplicateGroups, LocationInfo, Report};
use crate::source::GCS_SCHEME;

pub const DEFAULT_BACKUP_DIR: &str = "deleted_records";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeTargets {
    pub ids: bool,
    pub rows: bool,
}

/// Lines to drop, per file. Line numbers are 1-based, as in the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgePlan {
    pub deletions: BTreeMap<String, BTreeSet<u64>>,
}

impl PurgePlan {
    pub fn records(&self) -> usize {
        self.deletions.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub files_modified: u64,
    pub records_deleted: u64,
}

/// Keeps the first location of every selected group and marks the rest.
/// A location kept by one group is never deleted on behalf of another.
pub fn plan_purge(report: &Report, targets: PurgeTargets) -> Result<PurgePlan> {
    if report.summary.is_validation_report {
        return Err(anyhow!("a validation report has no duplicate groups to purge"));
    }

    let mut groups: Vec<&DuplicateGroups> = Vec::new();
    if targets.ids {
        groups.push(&report.duplicate_ids);
    }
    if targets.rows {
        groups.push(&report.duplicate_rows);
    }

    let mut keep = BTreeSet::<&LocationInfo>::new();
    let mut remove = BTreeSet::<&LocationInfo>::new();
    for locations in groups.into_iter().flat_map(|g| g.values()) {
        if let Some(location) = locations.iter().find(|l| l.file_path.starts_with(GCS_SCHEME)) {
            return Err(anyhow!(
                "purge only supports local files; {} is a cloud object",
                location.file_path
            ));
        }
        let Some((first, rest)) = locations.split_first() else {
            continue;
        };
        keep.insert(first);
        remove.extend(rest);
    }

    let mut plan = PurgePlan::default();
    for location in remove.difference(&keep) {
        plan.deletions
            .entry(location.file_path.clone())
            .or_default()
            .insert(location.line_number);
    }
    Ok(plan)
}

/// Rewrites every planned file without its marked lines. Removed lines are
/// appended to `<backup_dir>/deleted_records_<file name>` before the file is
/// touched. A file that fails is logged and skipped.
pub fn apply_purge(plan: &PurgePlan, backup_dir: impl AsRef<Path>) -> Result<PurgeOutcome> {
    let backup_dir = backup_dir.as_ref();
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("could not create backup dir {}", backup_dir.display()))?;

    let mut outcome = PurgeOutcome::default();
    for (file_path, lines) in &plan.deletions {
        match purge_file(Path::new(file_path), lines, backup_dir) {
            Ok(deleted) => {
                outcome.files_modified += 1;
                outcome.records_deleted += deleted;
            }
            Err(err) => warn!("purge: skipping {file_path}: {err:#}"),
        }
    }
    info!(
        "purge finished: {} record(s) removed from {} file(s)",
        outcome.records_deleted, outcome.files_modified
    );
    Ok(outcome)
}

fn purge_file(path: &Path, lines: &BTreeSet<u64>, backup_dir: &Path) -> Result<u64> {
    let data = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;

    let mut kept = Vec::with_capacity(data.len());
    let mut removed = Vec::new();
    let mut deleted = 0_u64;
    for (index, line) in data.split_inclusive(|byte| *byte == b'\n').enumerate() {
        if lines.contains(&(index as u64 + 1)) {
            removed.extend_from_slice(line);
            if !line.ends_with(b"\n") {
                removed.push(b'\n');
            }
            deleted += 1;
        } else {
            kept.extend_from_slice(line);
        }
    }

    if !removed.is_empty() {
        let backup_path = backup_path(backup_dir, path);
        let mut backup = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&backup_path)
            .with_context(|| format!("could not open backup {}", backup_path.display()))?;
        backup
            .write_all(&removed)
            .with_context(|| format!("could not write backup {}", backup_path.display()))?;
    }
    fs::write(path, kept).with_context(|| format!("could not overwrite {}", path.display()))?;
    Ok(deleted)
}

fn backup_path(backup_dir: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    backup_dir.join(format!("deleted_records_{name}"))
}
