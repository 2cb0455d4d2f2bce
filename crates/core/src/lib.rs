pub mod classify;
pub mod cloud;
pub mod discover;
pub mod engine;
pub mod error;
pub mod gcs;
pub mod purge;
pub mod render;
pub mod report;
pub mod source;

pub use classify::{canonical_bytes, content_hash, decode_row, format_key, KeyFormat, Row};
pub use cloud::{is_json_content_type, FsObjectStore, ObjectMeta, ObjectStore, JSON_CONTENT_TYPES};
pub use discover::{discover, discover_all, DiscoverOptions};
pub use engine::{
    Analyser, EngineConfig, EngineProgress, CANCEL_CHECK_INTERVAL, DEFAULT_WORKERS,
    MAX_LINE_BYTES,
};
pub use error::{DiscoveryError, SourceError};
pub use gcs::{GcsConfig, GcsObjectStore, ACCESS_TOKEN_ENV, EMULATOR_HOST_ENV, GCS_ENDPOINT};
pub use purge::{
    apply_purge, plan_purge, PurgeOutcome, PurgePlan, PurgeTargets, DEFAULT_BACKUP_DIR,
};
pub use render::{render_text, write_report_files, RenderOptions, ReportOutputs};
pub use report::{
    format_elapsed, human_size, load_report, DuplicateGroups, FolderDetail, LocationInfo, Report,
    Summary,
};
pub use source::{
    parse_gcs_uri, CloudObjectSource, LocalFileSource, Source, SourceHandle, SourceKind,
    SourceReader, GCS_SCHEME,
};
