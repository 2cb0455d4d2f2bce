use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::SourceError;
use crate::source::SourceReader;

/// Content types accepted as JSON/NDJSON when listing a bucket.
pub const JSON_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/x-ndjson",
    "application/json-seq",
    "application/jsonlines",
    "application/jsonlines+json",
    "application/x-jsonlines",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Boundary to a bucket-style object service.
///
/// `check_bucket` is the reachability check discovery runs before listing, so
/// missing credentials or buckets fail once instead of once per object.
pub trait ObjectStore: Send + Sync {
    fn check_bucket(&self, bucket: &str) -> Result<(), SourceError>;
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, SourceError>;
    fn open_object(&self, bucket: &str, name: &str) -> Result<SourceReader, SourceError>;
}

pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    JSON_CONTENT_TYPES.contains(&essence.as_str())
}

/// Serves buckets out of a local directory: every sub-directory of `root` is
/// a bucket and every file below it an object named by its relative path.
/// Used against storage emulator mounts and for offline runs.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

impl ObjectStore for FsObjectStore {
    fn check_bucket(&self, bucket: &str) -> Result<(), SourceError> {
        let dir = self.bucket_dir(bucket);
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(SourceError::Unavailable(format!(
                "bucket '{bucket}' is not a directory under {}",
                self.root.display()
            ))),
            Err(err) => Err(SourceError::Unavailable(format!(
                "bucket '{bucket}' not found or access denied: {err}"
            ))),
        }
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, SourceError> {
        let bucket_dir = self.bucket_dir(bucket);
        let mut objects = Vec::new();
        for entry in WalkDir::new(&bucket_dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                SourceError::Unavailable(format!("failed to list bucket '{bucket}': {err}"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = object_name(&bucket_dir, entry.path()) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            objects.push(ObjectMeta {
                bucket: bucket.to_string(),
                content_type: guess_content_type(&name).to_string(),
                name,
                size,
            });
        }
        Ok(objects)
    }

    fn open_object(&self, bucket: &str, name: &str) -> Result<SourceReader, SourceError> {
        let path = self.bucket_dir(bucket).join(name);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                })
            }
            Err(source) => Err(SourceError::OpenFailed {
                path: format!("gs://{bucket}/{name}"),
                source,
            }),
        }
    }
}

fn object_name(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    Some(parts.join("/"))
}

fn guess_content_type(name: &str) -> &'static str {
    let lowered = name.to_ascii_lowercase();
    if lowered.ends_with(".ndjson") || lowered.ends_with(".jsonl") {
        "application/x-ndjson"
    } else if lowered.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}
