use std::collections::BTreeMap;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Symlink,
    Other,
}

/// Per-file state captured in a prior snapshot (spec.md §3 Snapshot index,
/// §4.3 step 2). `device` is `None` when the run's config says the source
/// lives on NFS, so a remount that changes device numbers never looks like
/// every file moved (spec.md §5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub device: Option<u64>,
    pub inode: u64,
    pub size: u64,
    pub mtime_nanos: i64,
    pub kind: EntryKind,
}

impl FileState {
    pub fn from_metadata(metadata: &Metadata, source_on_nfs: bool) -> Self {
        let kind = if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        Self {
            device: if source_on_nfs { None } else { Some(metadata.dev()) },
            inode: metadata.ino(),
            size: metadata.size(),
            mtime_nanos: metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec(),
            kind,
        }
    }

    /// Whether `self` (the freshly observed state) differs from `previous`
    /// in a way that requires re-emitting the file (spec.md §4.3 step 2).
    pub fn differs_from(&self, previous: &FileState) -> bool {
        self.device != previous.device
            || self.inode != previous.inode
            || self.size != previous.size
            || self.mtime_nanos != previous.mtime_nanos
            || self.kind != previous.kind
    }
}

/// The persisted incremental index: relative path → last-emitted state
/// (spec.md §3 Snapshot index). `BTreeMap` keeps serialized output stable
/// across runs, which makes a stuck run's index diffable by an operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotIndex {
    pub entries: BTreeMap<String, FileState>,
}

impl SnapshotIndex {
    /// Loads the index from `path`, or returns an empty index if the file
    /// doesn't exist yet (spec.md §4.3 step 1: "empty index if first call").
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::IndexCorrupt {
                    message: format!("{path:?}: {e}"),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Atomically replaces the on-disk index: write to a sibling tempfile
    /// then rename, so a crash mid-write never leaves a half-written
    /// index file (spec.md §4.3 step 7). Callers must only invoke this
    /// after the corresponding chunk has been durably uploaded (spec.md
    /// §4.5 step d, §9 Open Questions).
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = tmp_sibling_path(path);
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn get(&self, rel_path: &str) -> Option<&FileState> {
        self.entries.get(rel_path)
    }

    pub fn insert(&mut self, rel_path: String, state: FileState) {
        self.entries.insert(rel_path, state);
    }
}

fn tmp_sibling_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapshot_index.json");
    path.with_file_name(format!(".{file_name}.tmp"))
}
