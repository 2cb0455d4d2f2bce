use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cloud::{ObjectMeta, ObjectStore};
use crate::error::SourceError;

pub const GCS_SCHEME: &str = "gs://";

pub type SourceReader = Box<dyn Read + Send>;

/// One streamable unit of input: a local file or a cloud object.
///
/// `path` is the unique identity used for the processed-set, `dir` the
/// containing group that per-folder metrics are keyed by.
pub trait Source: Send + Sync + fmt::Debug {
    fn path(&self) -> &str;
    fn dir(&self) -> &str;
    fn size(&self) -> u64;
    fn kind(&self) -> SourceKind;
    fn open(&self) -> Result<SourceReader, SourceError>;
}

pub type SourceHandle = Arc<dyn Source>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    Cloud,
}

#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: String,
    dir: String,
    size: u64,
}

impl LocalFileSource {
    /// `path` is expected to already be absolute and canonical.
    pub fn new(path: PathBuf, size: u64) -> Self {
        let dir = path
            .parent()
            .map(|parent| parent.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path: path.to_string_lossy().to_string(),
            dir,
            size,
        }
    }

    pub fn file_path(&self) -> &Path {
        Path::new(&self.path)
    }
}

impl Source for LocalFileSource {
    fn path(&self) -> &str {
        &self.path
    }

    fn dir(&self) -> &str {
        &self.dir
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn open(&self) -> Result<SourceReader, SourceError> {
        let file = File::open(&self.path).map_err(|source| SourceError::OpenFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

pub struct CloudObjectSource {
    store: Arc<dyn ObjectStore>,
    object: ObjectMeta,
    uri: String,
    dir: String,
}

impl CloudObjectSource {
    pub fn new(store: Arc<dyn ObjectStore>, object: ObjectMeta) -> Self {
        let uri = format!("{GCS_SCHEME}{}/{}", object.bucket, object.name);
        let dir = match object.name.rsplit_once('/') {
            Some((prefix, _)) => format!("{GCS_SCHEME}{}/{}", object.bucket, prefix),
            None => format!("{GCS_SCHEME}{}", object.bucket),
        };
        Self {
            store,
            object,
            uri,
            dir,
        }
    }

    pub fn object(&self) -> &ObjectMeta {
        &self.object
    }
}

impl fmt::Debug for CloudObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudObjectSource")
            .field("uri", &self.uri)
            .field("size", &self.object.size)
            .finish()
    }
}

impl Source for CloudObjectSource {
    fn path(&self) -> &str {
        &self.uri
    }

    fn dir(&self) -> &str {
        &self.dir
    }

    fn size(&self) -> u64 {
        self.object.size
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cloud
    }

    fn open(&self) -> Result<SourceReader, SourceError> {
        self.store
            .open_object(&self.object.bucket, &self.object.name)
    }
}

/// Splits `gs://bucket/prefix` into `(bucket, prefix)`.
pub fn parse_gcs_uri(uri: &str) -> Option<(&str, &str)> {
    let trimmed = uri.strip_prefix(GCS_SCHEME)?;
    match trimmed.split_once('/') {
        Some((bucket, prefix)) => Some((bucket, prefix)),
        None => Some((trimmed, "")),
    }
}
