use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::naming::natural_cmp;

/// Static exclusion names, always in effect (spec.md §4.4). `Config`'s
/// `TAR_EXCLUSIONS` extends this list rather than replacing it (Design
/// Notes/SPEC_FULL §4.4): an operator silencing one more noisy directory
/// shouldn't have to retype the defaults.
pub const STATIC_EXCLUSIONS: &[&str] = &[
    "Thumbnail_Images",
    "Images",
    "FocusModelGeneration",
    "Autocenter",
    "InstrumentAnalyticsLogs",
    "Logs",
];

/// Files newer than this are excluded from a non-final snapshot, to avoid
/// packaging a file the instrument may still be writing (spec.md §4.4).
pub const RECENT_MTIME_EXCLUSION_SECS: u64 = 180;

/// A materialized exclusion plan for one snapshot: path component names to
/// skip anywhere in the tree, plus a single absolute directory (the
/// newest base-call cycle dir) to skip only at finalization time it no
/// longer applies.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPlan {
    pub excluded_names: Vec<String>,
    pub excluded_dirs: Vec<PathBuf>,
    pub recent_mtime_cutoff: Option<SystemTime>,
}

impl ExclusionPlan {
    pub fn excludes_name(&self, name: &str) -> bool {
        self.excluded_names.iter().any(|n| n == name)
    }

    pub fn excludes_dir(&self, dir: &Path) -> bool {
        self.excluded_dirs.iter().any(|d| d == dir)
    }

    pub fn excludes_by_mtime(&self, mtime: SystemTime) -> bool {
        match self.recent_mtime_cutoff {
            Some(cutoff) => mtime > cutoff,
            None => false,
        }
    }
}

/// Builds the exclusion list for one snapshot. Dynamic exclusions (newest
/// base-call cycle dir, recent-mtime window) only apply when `is_final` is
/// false, per spec.md §4.4: the final snapshot must catch everything
/// previously deferred.
pub fn plan_exclusions(
    source_root: &Path,
    extra_static: &[String],
    is_final: bool,
    now: SystemTime,
) -> ExclusionPlan {
    let mut excluded_names: Vec<String> = STATIC_EXCLUSIONS.iter().map(|s| s.to_string()).collect();
    excluded_names.extend(extra_static.iter().cloned());

    if is_final {
        return ExclusionPlan {
            excluded_names,
            excluded_dirs: Vec::new(),
            recent_mtime_cutoff: None,
        };
    }

    let excluded_dirs = newest_basecall_cycle_dir(source_root)
        .into_iter()
        .collect();
    let cutoff = now
        .checked_sub(std::time::Duration::from_secs(RECENT_MTIME_EXCLUSION_SECS))
        .unwrap_or(now);

    ExclusionPlan {
        excluded_names,
        excluded_dirs,
        recent_mtime_cutoff: Some(cutoff),
    }
}

/// Finds the highest version-sorted `C<major>.<minor>` cycle directory
/// across all `Data/Intensities/BaseCalls/L*` lane directories (spec.md
/// §4.4). Returns `None` if the BaseCalls tree doesn't exist yet (common
/// early in a run).
fn newest_basecall_cycle_dir(source_root: &Path) -> Option<PathBuf> {
    let base_calls = source_root.join("Data/Intensities/BaseCalls");
    if !base_calls.is_dir() {
        return None;
    }

    let mut newest: Option<PathBuf> = None;
    let lane_dirs = std::fs::read_dir(&base_calls).ok()?;
    for lane_entry in lane_dirs.flatten() {
        let lane_path = lane_entry.path();
        if !lane_path.is_dir() {
            continue;
        }
        let lane_name = match lane_path.file_name().and_then(|n| n.to_str()) {
            Some(n) if n.starts_with('L') => n,
            _ => continue,
        };
        let _ = lane_name;

        let Ok(cycle_dirs) = std::fs::read_dir(&lane_path) else {
            continue;
        };
        for cycle_entry in cycle_dirs.flatten() {
            let cycle_path = cycle_entry.path();
            if !cycle_path.is_dir() {
                continue;
            }
            let Some(cycle_name) = cycle_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_cycle_dir_name(cycle_name) {
                continue;
            }
            let is_newer = match &newest {
                None => true,
                Some(current) => {
                    let current_name = current
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("");
                    natural_cmp(cycle_name, current_name) == std::cmp::Ordering::Greater
                }
            };
            if is_newer {
                newest = Some(cycle_path);
            }
        }
    }
    newest
}

fn is_cycle_dir_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('C') else {
        return false;
    };
    let Some((major, minor)) = rest.split_once('.') else {
        return false;
    };
    !major.is_empty()
        && !minor.is_empty()
        && major.bytes().all(|b| b.is_ascii_digit())
        && minor.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn final_snapshot_has_no_dynamic_exclusions() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = plan_exclusions(tmp.path(), &[], true, SystemTime::now());
        assert!(plan.excluded_dirs.is_empty());
        assert!(plan.recent_mtime_cutoff.is_none());
        assert!(plan.excludes_name("Logs"));
    }

    #[test]
    fn extra_static_exclusions_are_appended_not_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let extra = vec!["Custom".to_string()];
        let plan = plan_exclusions(tmp.path(), &extra, false, SystemTime::now());
        assert!(plan.excludes_name("Logs"));
        assert!(plan.excludes_name("Custom"));
    }

    #[test]
    fn picks_highest_cycle_dir_across_lanes() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("Data/Intensities/BaseCalls");
        fs::create_dir_all(base.join("L001/C1.1")).unwrap();
        fs::create_dir_all(base.join("L001/C10.1")).unwrap();
        fs::create_dir_all(base.join("L002/C2.1")).unwrap();

        let newest = newest_basecall_cycle_dir(tmp.path()).unwrap();
        assert_eq!(newest.file_name().unwrap().to_str().unwrap(), "C10.1");
    }

    #[test]
    fn missing_base_calls_tree_yields_no_dynamic_dir_exclusion() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(newest_basecall_cycle_dir(tmp.path()).is_none());
    }

    #[test]
    fn cycle_dir_name_validation() {
        assert!(is_cycle_dir_name("C1.1"));
        assert!(is_cycle_dir_name("C10.23"));
        assert!(!is_cycle_dir_name("C1"));
        assert!(!is_cycle_dir_name("Logs"));
    }
}
