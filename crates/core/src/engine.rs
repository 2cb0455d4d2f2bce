//! Bounded worker pool over a list of sources.
//!
//! One dispatcher thread feeds a channel of depth `workers`; `workers` threads
//! drain it. The channel is the only backpressure, so at most about `workers`
//! streams are open at once however many sources were discovered.
//!
//! Cancellation is polled: before a worker starts a source and every
//! [`CANCEL_CHECK_INTERVAL`] lines inside one. After the flag is set each
//! worker does at most that many more lines of work before it exits.

use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{content_hash, decode_row, format_key, KeyFormat, Row};
use crate::report::{
    format_elapsed, human_size, DuplicateGroups, FolderDetail, LocationInfo, Report, Summary,
};
use crate::source::{Source, SourceHandle, SourceReader};

pub const DEFAULT_WORKERS: usize = 8;
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;
pub const CANCEL_CHECK_INTERVAL: u64 = 1000;
const READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub key: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub check_key: bool,
    #[serde(default)]
    pub check_row: bool,
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default)]
    pub key_format: KeyFormat,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key: "id".to_string(),
            workers: DEFAULT_WORKERS,
            check_key: true,
            check_row: false,
            validate_only: false,
            key_format: KeyFormat::Loose,
        }
    }
}

impl EngineConfig {
    /// Validation always counts keys, whatever `check_key` says.
    pub fn counts_keys(&self) -> bool {
        self.check_key || self.validate_only
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow!("workers must be greater than zero"));
        }
        if self.counts_keys() && self.key.trim().is_empty() {
            return Err(anyhow!("a key is required when key checking is enabled"));
        }
        if !self.validate_only && !self.check_key && !self.check_row {
            return Err(anyhow!(
                "at least one check (key or row) must be enabled for a full analysis"
            ));
        }
        Ok(())
    }
}

/// Live counters for progress display. `current_folder` is last-writer-wins
/// and only advisory. `rows_processed` counts every row read, including rows
/// of a source that was later abandoned; reports count finished sources only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineProgress {
    pub files_processed: u64,
    pub total_files: u64,
    pub rows_processed: u64,
    pub current_folder: Option<String>,
}

/// Mutable session of one job. Each aggregate has its own lock so the
/// update paths of row classification do not serialize against each other.
#[derive(Default)]
struct EngineState {
    key_groups: Mutex<HashMap<String, Vec<LocationInfo>>>,
    row_groups: Mutex<HashMap<String, Vec<LocationInfo>>>,
    keys_found_per_folder: Mutex<HashMap<String, u64>>,
    rows_per_folder: Mutex<HashMap<String, u64>>,
    processed: Mutex<HashSet<String>>,
    catalog: Mutex<Catalog>,
    files_processed: AtomicU64,
    rows_processed: AtomicU64,
    current_folder: Mutex<Option<String>>,
    elapsed: Mutex<Duration>,
}

/// Groups and key counts of one source while it is being read. They reach
/// the shared aggregates only once the source has been read to the end, so a
/// cancelled or failed source leaves no trace and can be rescanned.
#[derive(Default)]
struct SourceTally {
    rows: u64,
    keys_found: u64,
    key_locations: Vec<(String, LocationInfo)>,
    row_locations: Vec<(String, LocationInfo)>,
}

/// Every source ever handed to `run`, in first-seen order.
#[derive(Default)]
struct Catalog {
    sources: Vec<SourceHandle>,
    paths: HashSet<String>,
}

impl Catalog {
    fn extend(&mut self, sources: &[SourceHandle]) {
        for source in sources {
            if self.paths.insert(source.path().to_string()) {
                self.sources.push(Arc::clone(source));
            }
        }
    }
}

pub struct Analyser {
    config: EngineConfig,
    state: EngineState,
}

impl Analyser {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: EngineState::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scans `sources` to completion or until `cancel` is set, then snapshots
    /// the accumulated state into a report.
    ///
    /// State accumulates across calls: totals cover every source any run has
    /// seen, so a continue run over the unprocessed remainder still reports
    /// against the full source list. Sources already processed are skipped.
    pub fn run(&self, cancel: &AtomicBool, sources: &[SourceHandle]) -> Report {
        let started = Instant::now();
        lock(&self.state.catalog).extend(sources);

        let workers = self.config.workers.max(1);
        info!(
            "analysis started: {} source(s), {} worker(s), key '{}'",
            sources.len(),
            workers,
            self.config.key
        );

        let (tx, rx) = bounded::<SourceHandle>(workers);
        thread::scope(|scope| {
            for index in 0..workers {
                let rx = rx.clone();
                scope.spawn(move || self.worker(index, cancel, rx));
            }
            drop(rx);

            scope.spawn(move || {
                for source in sources {
                    if cancel.load(Ordering::Relaxed) {
                        debug!("dispatcher stopping: cancellation observed");
                        break;
                    }
                    if self.is_processed(source.path()) {
                        debug!("skipping already processed source {}", source.path());
                        continue;
                    }
                    // Fails only once every worker has exited.
                    if tx.send(Arc::clone(source)).is_err() {
                        break;
                    }
                }
            });
        });

        *lock(&self.state.elapsed) += started.elapsed();
        let cancelled = cancel.load(Ordering::Relaxed);
        let report = self.build_report(cancelled);
        info!(
            "analysis {}: {}/{} file(s), {} row(s)",
            if cancelled { "cancelled" } else { "finished" },
            report.summary.files_processed,
            report.summary.total_files,
            report.summary.total_rows_processed
        );
        report
    }

    /// Sources from `all` not yet scanned to completion, in input order.
    /// Call between runs only.
    pub fn unprocessed_sources(&self, all: &[SourceHandle]) -> Vec<SourceHandle> {
        let processed = lock(&self.state.processed);
        all.iter()
            .filter(|source| !processed.contains(source.path()))
            .cloned()
            .collect()
    }

    pub fn is_processed(&self, path: &str) -> bool {
        lock(&self.state.processed).contains(path)
    }

    pub fn progress(&self) -> EngineProgress {
        EngineProgress {
            files_processed: self.state.files_processed.load(Ordering::Relaxed),
            total_files: lock(&self.state.catalog).sources.len() as u64,
            rows_processed: self.state.rows_processed.load(Ordering::Relaxed),
            current_folder: lock(&self.state.current_folder).clone(),
        }
    }

    fn worker(&self, index: usize, cancel: &AtomicBool, rx: Receiver<SourceHandle>) {
        for source in rx.iter() {
            if cancel.load(Ordering::Relaxed) {
                debug!("worker {index} exiting: cancellation observed");
                return;
            }
            self.process_source(source.as_ref(), cancel);
        }
    }

    fn process_source(&self, source: &dyn Source, cancel: &AtomicBool) {
        *lock(&self.state.current_folder) = Some(source.dir().to_string());

        let reader = match source.open() {
            Ok(reader) => reader,
            Err(err) => {
                warn!("error opening source {}: {}", source.path(), err);
                return;
            }
        };

        let mut tally = SourceTally::default();
        let mut lines = LineReader::new(reader, MAX_LINE_BYTES);
        let mut line_number = 0_u64;
        loop {
            let line = match lines.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!("read error in source {}: {}", source.path(), err);
                    return;
                }
            };
            if line_number % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                debug!(
                    "cancelled at line {} of {}; source left unprocessed",
                    line_number,
                    source.path()
                );
                return;
            }
            line_number += 1;
            if line.is_empty() {
                continue;
            }

            self.state.rows_processed.fetch_add(1, Ordering::Relaxed);
            tally.rows += 1;

            match decode_row(line) {
                Ok(row) => self.classify_row(&row, source.path(), line_number, &mut tally),
                Err(err) => warn!(
                    "error decoding JSON on line {} in source {}: {}",
                    line_number,
                    source.path(),
                    err
                ),
            }
        }

        let mut processed = lock(&self.state.processed);
        if !processed.insert(source.path().to_string()) {
            return;
        }
        self.merge_tally(source, tally);
        drop(processed);
        self.state.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn classify_row(&self, row: &Row, path: &str, line_number: u64, tally: &mut SourceTally) {
        let location = || LocationInfo {
            file_path: path.to_string(),
            line_number,
        };

        if self.config.counts_keys() {
            if let Some(value) = row.get(&self.config.key) {
                tally.keys_found += 1;
                if !self.config.validate_only {
                    let id = format_key(value, self.config.key_format);
                    tally.key_locations.push((id, location()));
                }
            }
        }

        if self.config.check_row && !self.config.validate_only {
            tally.row_locations.push((content_hash(row), location()));
        }
    }

    /// Folds a fully read source into the shared aggregates.
    fn merge_tally(&self, source: &dyn Source, tally: SourceTally) {
        *lock(&self.state.rows_per_folder)
            .entry(source.dir().to_string())
            .or_insert(0) += tally.rows;
        if tally.keys_found > 0 {
            *lock(&self.state.keys_found_per_folder)
                .entry(source.dir().to_string())
                .or_insert(0) += tally.keys_found;
        }
        if !tally.key_locations.is_empty() {
            let mut groups = lock(&self.state.key_groups);
            for (id, location) in tally.key_locations {
                groups.entry(id).or_default().push(location);
            }
        }
        if !tally.row_locations.is_empty() {
            let mut groups = lock(&self.state.row_groups);
            for (hash, location) in tally.row_locations {
                groups.entry(hash).or_default().push(location);
            }
        }
    }

    /// Snapshot of the current state. Folder totals come from the whole
    /// catalogue, processed figures from the processed-set.
    pub fn build_report(&self, partial: bool) -> Report {
        let validate_only = self.config.validate_only;
        let catalog = lock(&self.state.catalog);
        let dir_of = catalog
            .sources
            .iter()
            .map(|source| (source.path(), source.dir()))
            .collect::<HashMap<_, _>>();

        let mut total_key_occurrences = 0_u64;
        let mut unique_keys_duplicated = 0_u64;
        let mut duplicate_ids = DuplicateGroups::new();
        let mut duplicate_ids_per_folder = Default::default();
        if self.config.counts_keys() && !validate_only {
            let groups = lock(&self.state.key_groups);
            for (id, locations) in groups.iter() {
                total_key_occurrences += locations.len() as u64;
                if locations.len() > 1 {
                    unique_keys_duplicated += 1;
                    count_per_folder(&mut duplicate_ids_per_folder, locations, &dir_of);
                    duplicate_ids.insert(id.clone(), locations.clone());
                }
            }
        }

        let mut duplicate_row_instances = 0_u64;
        let mut duplicate_rows = DuplicateGroups::new();
        let mut duplicate_rows_per_folder = Default::default();
        if self.config.check_row && !validate_only {
            let groups = lock(&self.state.row_groups);
            for (hash, locations) in groups.iter() {
                if locations.len() > 1 {
                    duplicate_row_instances += locations.len() as u64;
                    count_per_folder(&mut duplicate_rows_per_folder, locations, &dir_of);
                    duplicate_rows.insert(hash.clone(), locations.clone());
                }
            }
        }

        let processed = lock(&self.state.processed);
        let keys_found = lock(&self.state.keys_found_per_folder);
        let rows_per_folder = lock(&self.state.rows_per_folder);
        let mut folder_details = std::collections::BTreeMap::<String, FolderDetail>::new();
        let mut total_bytes = 0_u64;
        for source in &catalog.sources {
            let detail = folder_details.entry(source.dir().to_string()).or_default();
            detail.total_files += 1;
            detail.total_size_bytes += source.size();
            total_bytes += source.size();
            if processed.contains(source.path()) {
                detail.files_processed += 1;
                detail.processed_size_bytes += source.size();
            }
        }
        let mut processed_bytes = 0_u64;
        let mut total_keys_found = 0_u64;
        let mut rows_processed = 0_u64;
        for (dir, detail) in folder_details.iter_mut() {
            detail.keys_found = keys_found.get(dir).copied().unwrap_or(0);
            detail.rows_processed = rows_per_folder.get(dir).copied().unwrap_or(0);
            processed_bytes += detail.processed_size_bytes;
            total_keys_found += detail.keys_found;
            rows_processed += detail.rows_processed;
        }
        if validate_only {
            total_key_occurrences = total_keys_found;
        }

        let files_processed = processed.len() as u64;
        let average_rows_per_file = if files_processed > 0 {
            rows_processed as f64 / files_processed as f64
        } else {
            0.0
        };
        let average_files_per_folder = if folder_details.is_empty() {
            0.0
        } else {
            catalog.sources.len() as f64 / folder_details.len() as f64
        };
        let elapsed = *lock(&self.state.elapsed);

        Report {
            summary: Summary {
                is_validation_report: validate_only,
                is_partial_report: partial,
                files_processed,
                total_files: catalog.sources.len() as u64,
                processed_data_size_bytes: processed_bytes,
                total_data_size_overall_bytes: total_bytes,
                processed_data_size_human: human_size(processed_bytes),
                total_data_size_overall_human: human_size(total_bytes),
                total_elapsed_time: format_elapsed(elapsed),
                total_elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
                total_rows_processed: rows_processed,
                unique_key: self.config.key.clone(),
                total_key_occurrences,
                unique_keys_duplicated,
                duplicate_row_instances,
                average_rows_per_file,
                average_files_per_folder,
                duplicate_ids_per_folder,
                duplicate_rows_per_folder,
                folder_details,
            },
            duplicate_ids,
            duplicate_rows,
        }
    }
}

fn count_per_folder(
    counts: &mut std::collections::BTreeMap<String, u64>,
    locations: &[LocationInfo],
    dir_of: &HashMap<&str, &str>,
) {
    for location in locations {
        let dir = dir_of
            .get(location.file_path.as_str())
            .copied()
            .unwrap_or_default();
        *counts.entry(dir.to_string()).or_insert(0) += 1;
    }
}

/// Aggregates stay usable after a worker panic; a poisoned lock only means a
/// row may be missing from a group.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Newline-delimited reader with a hard per-line limit. An over-long line is
/// a stream error, not a skipped row. A trailing `\r` is dropped.
struct LineReader {
    inner: BufReader<SourceReader>,
    buf: Vec<u8>,
    max_len: usize,
}

impl LineReader {
    fn new(reader: SourceReader, max_len: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_BUFFER_BYTES, reader),
            buf: Vec::new(),
            max_len,
        }
    }

    fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        self.buf.clear();
        let limit = self.max_len as u64 + 1;
        let read = self
            .inner
            .by_ref()
            .take(limit)
            .read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > self.max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds maximum length of {} bytes", self.max_len),
            ));
        }
        Ok(Some(&self.buf))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::{Analyser, EngineConfig, LineReader, MAX_LINE_BYTES};
    use crate::error::SourceError;
    use crate::source::{Source, SourceHandle, SourceKind, SourceReader};

    #[derive(Debug)]
    struct MemorySource {
        path: String,
        dir: String,
        body: Option<String>,
    }

    impl MemorySource {
        fn handle(path: &str, dir: &str, body: &str) -> SourceHandle {
            Arc::new(Self {
                path: path.to_string(),
                dir: dir.to_string(),
                body: Some(body.to_string()),
            })
        }

        fn broken(path: &str, dir: &str) -> SourceHandle {
            Arc::new(Self {
                path: path.to_string(),
                dir: dir.to_string(),
                body: None,
            })
        }
    }

    impl Source for MemorySource {
        fn path(&self) -> &str {
            &self.path
        }

        fn dir(&self) -> &str {
            &self.dir
        }

        fn size(&self) -> u64 {
            self.body.as_ref().map_or(0, |body| body.len() as u64)
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Local
        }

        fn open(&self) -> Result<SourceReader, SourceError> {
            match &self.body {
                Some(body) => Ok(Box::new(Cursor::new(body.clone().into_bytes()))),
                None => Err(SourceError::OpenFailed {
                    path: self.path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                }),
            }
        }
    }

    fn config(check_key: bool, check_row: bool) -> EngineConfig {
        EngineConfig {
            key: "id".to_string(),
            workers: 3,
            check_key,
            check_row,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn line_reader_splits_and_trims_carriage_returns() {
        let mut reader = LineReader::new(Box::new(Cursor::new(b"a\r\n\nbc".to_vec())), 16);
        assert_eq!(reader.next_line().expect("line"), Some(&b"a"[..]));
        assert_eq!(reader.next_line().expect("line"), Some(&b""[..]));
        assert_eq!(reader.next_line().expect("line"), Some(&b"bc"[..]));
        assert_eq!(reader.next_line().expect("eof"), None);
    }

    #[test]
    fn line_reader_rejects_overlong_lines() {
        let mut reader = LineReader::new(Box::new(Cursor::new(b"12345\n123456\n".to_vec())), 5);
        assert_eq!(reader.next_line().expect("fits"), Some(&b"12345"[..]));
        assert!(reader.next_line().is_err());
    }

    #[test]
    fn counts_rows_and_skips_bad_lines() {
        let sources = vec![MemorySource::handle(
            "/d/a.json",
            "/d",
            "{\"id\":\"a\"}\n\nnot json\n{\"id\":\"a\"}\n{\"other\":1}\n",
        )];
        let analyser = Analyser::new(config(true, false));
        let report = analyser.run(&AtomicBool::new(false), &sources);

        assert!(!report.summary.is_partial_report);
        assert_eq!(report.summary.total_rows_processed, 4);
        assert_eq!(report.summary.total_key_occurrences, 2);
        let locations = &report.duplicate_ids["a"];
        assert_eq!(
            locations.iter().map(|l| l.line_number).collect::<Vec<_>>(),
            vec![1, 4]
        );
        let folder = &report.summary.folder_details["/d"];
        assert_eq!(folder.rows_processed, 4);
        assert_eq!(folder.keys_found, 2);
        assert_eq!(report.summary.duplicate_ids_per_folder["/d"], 2);
    }

    #[test]
    fn open_failure_leaves_source_unprocessed() {
        let sources = vec![
            MemorySource::handle("/d/a.json", "/d", "{\"id\":1}\n"),
            MemorySource::broken("/d/b.json", "/d"),
        ];
        let analyser = Analyser::new(config(true, false));
        let report = analyser.run(&AtomicBool::new(false), &sources);

        assert_eq!(report.summary.files_processed, 1);
        assert_eq!(report.summary.total_files, 2);
        let remaining = analyser.unprocessed_sources(&sources);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path(), "/d/b.json");
    }

    #[test]
    fn row_check_runs_without_key_check() {
        let sources = vec![
            MemorySource::handle("/d/a.json", "/d", "{\"x\":1,\"y\":2}\n"),
            MemorySource::handle("/e/b.json", "/e", "{\"y\":2,\"x\":1}\n{\"x\":3}\n"),
        ];
        let analyser = Analyser::new(config(false, true));
        let report = analyser.run(&AtomicBool::new(false), &sources);

        assert!(report.duplicate_ids.is_empty());
        assert_eq!(report.duplicate_rows.len(), 1);
        assert_eq!(report.summary.duplicate_row_instances, 2);
        assert_eq!(report.summary.duplicate_rows_per_folder["/d"], 1);
        assert_eq!(report.summary.duplicate_rows_per_folder["/e"], 1);
        assert_eq!(report.summary.total_key_occurrences, 0);
    }

    #[test]
    fn pre_cancelled_run_processes_nothing() {
        let sources = (0..5)
            .map(|i| MemorySource::handle(&format!("/d/{i}.json"), "/d", "{\"id\":1}\n"))
            .collect::<Vec<_>>();
        let analyser = Analyser::new(config(true, false));
        let report = analyser.run(&AtomicBool::new(true), &sources);

        assert!(report.summary.is_partial_report);
        assert_eq!(report.summary.files_processed, 0);
        assert_eq!(report.summary.total_files, 5);
        assert_eq!(analyser.unprocessed_sources(&sources).len(), 5);
    }

    #[test]
    fn rerun_skips_processed_sources() {
        let sources = vec![MemorySource::handle("/d/a.json", "/d", "{\"id\":1}\n")];
        let analyser = Analyser::new(config(true, false));
        analyser.run(&AtomicBool::new(false), &sources);
        let report = analyser.run(&AtomicBool::new(false), &sources);

        assert_eq!(report.summary.files_processed, 1);
        assert_eq!(report.summary.total_key_occurrences, 1);
        assert!(report.duplicate_ids.is_empty());
    }

    #[test]
    fn overlong_line_discards_the_whole_source() {
        let mut body = String::from("{\"id\":\"a\",\"n\":1}\n{\"id\":\"b\"}\n");
        body.push_str(&"x".repeat(MAX_LINE_BYTES + 1));
        body.push('\n');
        body.push_str("{\"id\":\"c\"}\n");
        let sources = vec![
            MemorySource::handle("/d/big.json", "/d", &body),
            MemorySource::handle("/e/ok.json", "/e", "{\"id\":\"a\",\"n\":1}\n"),
        ];
        let analyser = Analyser::new(config(true, true));
        let report = analyser.run(&AtomicBool::new(false), &sources);

        assert!(!report.summary.is_partial_report);
        assert_eq!(report.summary.files_processed, 1);
        assert!(report.duplicate_ids.is_empty());
        assert!(report.duplicate_rows.is_empty());
        assert_eq!(report.summary.total_key_occurrences, 1);
        assert_eq!(report.summary.total_rows_processed, 1);
        assert_eq!(report.summary.folder_details["/d"].keys_found, 0);
        assert_eq!(report.summary.folder_details["/d"].rows_processed, 0);
        assert_eq!(analyser.progress().rows_processed, 3);

        let remaining = analyser.unprocessed_sources(&sources);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path(), "/d/big.json");
    }

    #[test]
    fn validation_counts_keys_even_with_key_check_off() {
        let sources = vec![MemorySource::handle(
            "/d/a.json",
            "/d",
            "{\"id\":1}\n{\"id\":1}\n{\"x\":2}\n",
        )];
        let analyser = Analyser::new(EngineConfig {
            validate_only: true,
            ..config(false, false)
        });
        let report = analyser.run(&AtomicBool::new(false), &sources);

        assert!(report.summary.is_validation_report);
        assert_eq!(report.summary.total_key_occurrences, 2);
        assert_eq!(report.summary.folder_details["/d"].keys_found, 2);
        assert!(report.duplicate_ids.is_empty());
    }

    #[test]
    fn config_validation() {
        assert!(config(true, false).validate().is_ok());
        assert!(config(false, false).validate().is_err());
        let zero = EngineConfig {
            workers: 0,
            ..config(true, true)
        };
        assert!(zero.validate().is_err());
        let validation = EngineConfig {
            validate_only: true,
            ..config(false, false)
        };
        assert!(validation.validate().is_ok());
    }
}
