use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Keeps the `reserve_n` most recently modified regular files in `dir` and
/// deletes the rest. Returns the deleted paths; failures are logged and skipped.
pub fn enforce_reserve(dir: &Path, reserve_n: usize) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("retention: cannot list {}: {err}", dir.display());
            return Vec::new();
        }
    };

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some((meta.modified().unwrap_or(UNIX_EPOCH), entry.path()))
        })
        .collect();
    if files.len() <= reserve_n {
        return Vec::new();
    }

    files.sort_by(|a, b| b.0.cmp(&a.0));

    let mut deleted = Vec::new();
    for (_, path) in files.into_iter().skip(reserve_n) {
        match fs::remove_file(&path) {
            Ok(()) => deleted.push(path),
            Err(err) => log::warn!("retention: failed to remove {}: {err}", path.display()),
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_keeps_newest_reserve_n() {
        let dir = TempDir::new().unwrap();
        let oldest = touch(dir.path(), "a.txt.gz", 300);
        let middle = touch(dir.path(), "b.txt.gz", 200);
        let newest = touch(dir.path(), "c.txt", 100);
        fs::create_dir(dir.path().join("nested")).unwrap();

        let deleted = enforce_reserve(dir.path(), 2);

        assert_eq!(deleted, vec![oldest.clone()]);
        assert!(!oldest.exists());
        assert!(middle.exists());
        assert!(newest.exists());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_under_reserve_is_noop() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt", 10);
        assert!(enforce_reserve(dir.path(), 5).is_empty());
    }
}
