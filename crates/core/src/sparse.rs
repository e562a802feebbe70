use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

/// Returns true if `metadata` describes a file whose allocated block count
/// is smaller than its reported size — i.e. a sparse file on a filesystem
/// that reports `st_blocks` honestly (Linux). This is used for logging
/// only (spec.md §3 Chunk property iii is satisfied structurally, not via
/// hand-rolled GNU sparse tar headers; see DESIGN.md).
pub fn is_sparse(metadata: &Metadata) -> bool {
    if !metadata.is_file() {
        return false;
    }
    let allocated_bytes = metadata.blocks() * 512;
    allocated_bytes < metadata.size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dense_file_is_not_sparse() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut file = tmp.reopen().unwrap();
        file.write_all(&vec![1u8; 8192]).unwrap();
        file.sync_all().unwrap();
        let metadata = std::fs::metadata(tmp.path()).unwrap();
        assert!(!is_sparse(&metadata));
    }
}
