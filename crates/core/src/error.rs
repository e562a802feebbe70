use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds per spec.md §7. Every variant maps to process exit code 1;
/// the distinction exists for logging and for callers that want to branch
/// (e.g. the CLI prints a different message for `StaleRun` than for
/// `UploadFailed`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required tool or capability: {message}")]
    MissingDependency { message: String },

    #[error("bad arguments: {message}")]
    BadArguments { message: String },

    #[error("stale run: {message}")]
    StaleRun { message: String },

    #[error("run timed out after {elapsed_days} days")]
    Timeout { elapsed_days: u64 },

    #[error("snapshot index corrupt: {message}")]
    IndexCorrupt { message: String },

    #[error("snapshot failed: {message}")]
    SnapshotFailed { message: String },

    #[error("upload failed: {message}")]
    UploadFailed { message: String },

    #[error("compose failed: {message}")]
    ComposeFailed { message: String },

    #[error("interrupted by signal")]
    Interrupted,

    #[error("unsupported path (must be UTF-8): {path:?}")]
    NonUtf8Path { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this error, per spec.md §6: every fatal kind
    /// exits 1. Kept as a method (rather than inlined in `main`) so the CLI
    /// front-end has a single place to change if that ever needs to vary.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
