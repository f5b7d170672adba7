//! Candidate ordering for space reclamation.

use std::cmp::Reverse;

use super::ManagedFile;

/// Picks which files of a candidate bucket to delete, in deletion order.
///
/// Implementations return at most `max_to_remove` entries. The guard still
/// stops early once the soft threshold is met, so the tail of the returned
/// list may survive.
pub trait ReclaimStrategy: Send + Sync {
    fn select(&self, candidates: &[ManagedFile], max_to_remove: usize) -> Vec<ManagedFile>;
}

/// Oldest modification time first.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestFirst;

impl ReclaimStrategy for OldestFirst {
    fn select(&self, candidates: &[ManagedFile], max_to_remove: usize) -> Vec<ManagedFile> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by_key(|file| file.modified);
        sorted.truncate(max_to_remove);
        sorted
    }
}

/// Biggest files first; ties broken oldest first. Frees the threshold with
/// fewer deletions when file sizes vary widely.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirst;

impl ReclaimStrategy for LargestFirst {
    fn select(&self, candidates: &[ManagedFile], max_to_remove: usize) -> Vec<ManagedFile> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by_key(|file| (Reverse(file.size), file.modified));
        sorted.truncate(max_to_remove);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    fn file(name: &str, age_secs: u64, size: u64) -> ManagedFile {
        ManagedFile {
            path: PathBuf::from(name),
            modified: UNIX_EPOCH + Duration::from_secs(1_000 - age_secs),
            size,
        }
    }

    #[test]
    fn test_oldest_first_orders_by_mtime() {
        let files = vec![file("b", 10, 1), file("a", 30, 1), file("c", 20, 1)];
        let picked = OldestFirst.select(&files, 2);
        let names: Vec<_> = picked.iter().map(|f| f.path.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("a"), PathBuf::from("c")]);
    }

    #[test]
    fn test_zero_quota_selects_nothing() {
        let files = vec![file("a", 1, 1)];
        assert!(OldestFirst.select(&files, 0).is_empty());
        assert!(LargestFirst.select(&files, 0).is_empty());
    }

    #[test]
    fn test_largest_first_breaks_ties_by_age() {
        let files = vec![file("small", 50, 10), file("big_new", 1, 500), file("big_old", 40, 500)];
        let picked = LargestFirst.select(&files, 3);
        let names: Vec<_> = picked.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("big_old"),
                PathBuf::from("big_new"),
                PathBuf::from("small")
            ]
        );
    }
}
