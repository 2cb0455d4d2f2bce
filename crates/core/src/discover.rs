use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cloud::{is_json_content_type, ObjectStore};
use crate::error::DiscoveryError;
use crate::source::{
    parse_gcs_uri, CloudObjectSource, LocalFileSource, SourceHandle, GCS_SCHEME,
};

const JSON_EXTENSIONS: &[&str] = &["json", "ndjson", "jsonl"];

#[derive(Clone, Default)]
pub struct DiscoverOptions {
    pub excludes: Vec<String>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

/// Resolves every root and concatenates the results, keeping the first
/// occurrence of each canonical source path so overlapping roots are safe.
pub fn discover_all(
    roots: &[String],
    options: &DiscoverOptions,
) -> Result<Vec<SourceHandle>, DiscoveryError> {
    let mut sources: Vec<SourceHandle> = Vec::new();
    let mut seen = HashSet::new();

    for root in roots {
        let root = root.trim();
        if root.is_empty() {
            continue;
        }
        for source in discover(root, options)? {
            if seen.insert(source.path().to_string()) {
                sources.push(source);
            }
        }
    }

    if sources.is_empty() {
        return Err(DiscoveryError::NoSources);
    }
    Ok(sources)
}

pub fn discover(root: &str, options: &DiscoverOptions) -> Result<Vec<SourceHandle>, DiscoveryError> {
    let excludes = ExcludeMatcher::new(&options.excludes);
    if root.starts_with(GCS_SCHEME) {
        return discover_cloud(root, options, &excludes);
    }
    discover_local(root, options, &excludes)
}

fn discover_local(
    root: &str,
    options: &DiscoverOptions,
    excludes: &ExcludeMatcher,
) -> Result<Vec<SourceHandle>, DiscoveryError> {
    let canonical = fs::canonicalize(root).map_err(|err| DiscoveryError::InvalidRoot {
        root: root.to_string(),
        reason: err.to_string(),
    })?;
    if !canonical.is_dir() {
        return Err(DiscoveryError::InvalidRoot {
            root: root.to_string(),
            reason: "local path is not a directory".to_string(),
        });
    }

    let iter = WalkDir::new(&canonical)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !excludes.is_excluded(entry.path()));

    let mut sources: Vec<SourceHandle> = Vec::new();
    let mut seen = HashSet::new();
    for item in iter {
        if is_cancelled(options) {
            return Err(DiscoveryError::Cancelled);
        }
        let entry = match item {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(DiscoveryError::Walk {
                    root: root.to_string(),
                    source: err,
                })
            }
            Err(err) => {
                warn!("walk error under {}: {}", canonical.display(), err);
                continue;
            }
        };
        if !has_json_extension(entry.path()) {
            continue;
        }
        let (path, size) = if entry.file_type().is_symlink() {
            match resolve_file_link(entry.path()) {
                Some(resolved) => resolved,
                None => continue,
            }
        } else if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(metadata) => (entry.path().to_path_buf(), metadata.len()),
                Err(err) => {
                    warn!("metadata read failed for {}: {}", entry.path().display(), err);
                    continue;
                }
            }
        } else {
            continue;
        };
        if seen.insert(path.clone()) {
            sources.push(Arc::new(LocalFileSource::new(path, size)));
        }
    }

    if sources.is_empty() {
        return Err(DiscoveryError::NoMatches {
            root: root.to_string(),
        });
    }
    debug!("discovered {} local source(s) under {}", sources.len(), canonical.display());
    Ok(sources)
}

fn discover_cloud(
    root: &str,
    options: &DiscoverOptions,
    excludes: &ExcludeMatcher,
) -> Result<Vec<SourceHandle>, DiscoveryError> {
    let (bucket, prefix) = match parse_gcs_uri(root) {
        Some((bucket, prefix)) if !bucket.is_empty() => (bucket, prefix),
        _ => {
            return Err(DiscoveryError::InvalidRoot {
                root: root.to_string(),
                reason: "bucket name cannot be empty".to_string(),
            })
        }
    };

    let store = options
        .object_store
        .as_ref()
        .ok_or_else(|| DiscoveryError::SourceUnavailable {
            root: root.to_string(),
            reason: "no object store client is configured".to_string(),
        })?;

    store
        .check_bucket(bucket)
        .map_err(|err| DiscoveryError::SourceUnavailable {
            root: root.to_string(),
            reason: err.to_string(),
        })?;

    let objects = store
        .list_objects(bucket, prefix)
        .map_err(|err| DiscoveryError::SourceUnavailable {
            root: root.to_string(),
            reason: err.to_string(),
        })?;

    let mut sources: Vec<SourceHandle> = Vec::new();
    for object in objects {
        if is_cancelled(options) {
            return Err(DiscoveryError::Cancelled);
        }
        if object.name.ends_with('/') || !is_json_content_type(&object.content_type) {
            continue;
        }
        let source = CloudObjectSource::new(Arc::clone(store), object);
        if excludes.is_excluded(Path::new(source.object().name.as_str())) {
            continue;
        }
        sources.push(Arc::new(source));
    }

    if sources.is_empty() {
        return Err(DiscoveryError::NoMatches {
            root: root.to_string(),
        });
    }
    Ok(sources)
}

/// A link to a regular file resolves to the canonical target, so a link and
/// its target count once. Links to directories are not walked.
fn resolve_file_link(link: &Path) -> Option<(PathBuf, u64)> {
    let target = match fs::canonicalize(link) {
        Ok(target) => target,
        Err(err) => {
            debug!("skipping dangling link {}: {}", link.display(), err);
            return None;
        }
    };
    match fs::metadata(&target) {
        Ok(metadata) if metadata.is_file() => Some((target, metadata.len())),
        Ok(_) => {
            debug!("skipping link {} to non-file {}", link.display(), target.display());
            None
        }
        Err(err) => {
            warn!("metadata read failed for {}: {}", target.display(), err);
            None
        }
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| JSON_EXTENSIONS.contains(&ext.as_str()))
}

fn is_cancelled(options: &DiscoverOptions) -> bool {
    options
        .cancel_flag
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Glob patterns plus plain substrings (anything without glob metacharacters).
struct ExcludeMatcher {
    globset: Option<GlobSet>,
    substrings: Vec<String>,
}

impl ExcludeMatcher {
    fn new(patterns: &[String]) -> Self {
        if patterns.is_empty() {
            return Self {
                globset: None,
                substrings: Vec::new(),
            };
        }

        let mut builder = GlobSetBuilder::new();
        let mut substrings = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            if is_plain_substring_pattern(pattern) {
                substrings.push(pattern.to_lowercase());
                continue;
            }
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    warn!("invalid exclude glob '{pattern}': {err}; using substring fallback");
                    substrings.push(pattern.to_lowercase());
                }
            }
        }

        let globset = match builder.build() {
            Ok(set) => Some(set),
            Err(err) => {
                warn!("failed to compile exclude glob set: {err}; glob excludes disabled");
                None
            }
        };

        Self {
            globset,
            substrings,
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if let Some(globset) = &self.globset {
            if globset.is_match(path) {
                return true;
            }
        }
        if self.substrings.is_empty() {
            return false;
        }
        let lowered = path.to_string_lossy().to_lowercase();
        self.substrings
            .iter()
            .any(|pattern| lowered.contains(pattern))
    }
}

fn is_plain_substring_pattern(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|ch| matches!(ch, '*' | '?' | '[' | ']' | '{' | '}'))
}
