use std::cmp::Ordering;
use std::path::Path;

use crate::{Error, Result};

/// Extracts the run identifier from a source path: the final path
/// component. Every sidecar and remote prefix is keyed off this value.
pub fn run_id_from_path(source_path: &Path) -> Result<String> {
    source_path
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::BadArguments {
            message: format!("cannot derive run id from path {source_path:?}"),
        })
}

/// Builds a chunk object name: `<unix_epoch_seconds>_part-<n>.tar.gz`, `n`
/// starting at 1. The epoch prefix is what makes `natural_cmp` order chunks
/// chronologically without a separate sequence counter in the index.
pub fn chunk_object_name(unix_epoch_secs: u64, part_no: u32) -> String {
    format!("{unix_epoch_secs}_part-{part_no}.tar.gz")
}

/// Compares two strings the way remote part names need to sort: runs of
/// ASCII digits compare numerically, everything else compares byte-wise.
/// This keeps `9_part-1.tar.gz` before `10_part-1.tar.gz`, which a plain
/// lexical sort would get backwards.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.as_bytes().iter().peekable();
    let mut bi = b.as_bytes().iter().peekable();

    loop {
        match (ai.peek(), bi.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&&ac), Some(&&bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let a_num = take_digits(&mut ai);
                    let b_num = take_digits(&mut bi);
                    match a_num.len().cmp(&b_num.len()) {
                        Ordering::Equal => match a_num.cmp(&b_num) {
                            Ordering::Equal => continue,
                            other => return other,
                        },
                        other => return other,
                    }
                } else {
                    match ac.cmp(&bc) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                            continue;
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_digits<'a, I: Iterator<Item = &'a u8>>(
    iter: &mut std::iter::Peekable<I>,
) -> Vec<u8> {
    let mut digits = Vec::new();
    while let Some(&&c) = iter.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            iter.next();
        } else {
            break;
        }
    }
    digits
}

/// Sorts object names in place using `natural_cmp`.
pub fn sort_natural(names: &mut [String]) {
    names.sort_by(|a, b| natural_cmp(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_final_path_component() {
        let id = run_id_from_path(Path::new("/data/250714_A00123_0042_BHJKLMDSXX")).unwrap();
        assert_eq!(id, "250714_A00123_0042_BHJKLMDSXX");
    }

    #[test]
    fn run_id_rejects_root() {
        assert!(run_id_from_path(Path::new("/")).is_err());
    }

    #[test]
    fn chunk_names_follow_unix_epoch_part_pattern() {
        assert_eq!(chunk_object_name(1_700_000_000, 1), "1700000000_part-1.tar.gz");
        assert_eq!(chunk_object_name(1_700_000_600, 2), "1700000600_part-2.tar.gz");
    }

    #[test]
    fn natural_cmp_orders_numeric_runs_numerically() {
        assert_eq!(natural_cmp("9_part-1.tar.gz", "10_part-1.tar.gz"), Ordering::Less);
        assert_eq!(natural_cmp("10_part-1.tar.gz", "9_part-1.tar.gz"), Ordering::Greater);
        assert_eq!(natural_cmp("100_part-1.tar.gz", "100_part-1.tar.gz"), Ordering::Equal);
    }

    #[test]
    fn sort_natural_produces_chronological_order() {
        let mut names = vec![
            "1700000600_part-2.tar.gz".to_string(),
            "1700000000_part-1.tar.gz".to_string(),
            "1700060000_part-3.tar.gz".to_string(),
        ];
        sort_natural(&mut names);
        assert_eq!(
            names,
            vec![
                "1700000000_part-1.tar.gz",
                "1700000600_part-2.tar.gz",
                "1700060000_part-3.tar.gz",
            ]
        );
    }
}
