//! Disk quota enforcement
//!
//! Evicts the oldest direct children of a set of root directories until the
//! total fits a byte budget. "Oldest" is the lexicographically smallest file
//! name: session directories and clips are named after their creation time,
//! so name order tracks age without depending on mtimes.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One evictable child of a quota root
#[derive(Debug, Clone)]
pub struct QuotaScanEntry {
    pub path: PathBuf,
    pub name: OsString,
    pub size: u64,
}

/// Stateless quota enforcer
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaEnforcer;

impl QuotaEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate direct children of every existing root, sorted by name
    pub fn scan(&self, roots: &[PathBuf]) -> Vec<QuotaScanEntry> {
        let mut entries = Vec::new();

        for root in roots.iter().filter(|r| r.is_dir()) {
            let read = match fs::read_dir(root) {
                Ok(read) => read,
                Err(e) => {
                    tracing::warn!("Cannot list quota root {:?}: {}", root, e);
                    continue;
                }
            };

            for entry in read.flatten() {
                let path = entry.path();
                entries.push(QuotaScanEntry {
                    size: dir_size_recursive(&path),
                    name: entry.file_name(),
                    path,
                });
            }
        }

        // sort_by is stable: equal names keep root order
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Total size of everything under the roots
    pub fn total_size(&self, roots: &[PathBuf]) -> u64 {
        self.scan(roots).iter().map(|e| e.size).sum()
    }

    /// Delete oldest-first until the roots fit `quota_bytes`
    pub fn enforce(&self, roots: &[PathBuf], quota_bytes: u64) -> Vec<PathBuf> {
        self.enforce_excluding(roots, quota_bytes, &[])
    }

    /// Like [`enforce`](Self::enforce), but never deletes an entry that is or
    /// contains one of `protected` (e.g. the active recording target).
    /// Protected entries still count toward the total.
    pub fn enforce_excluding(
        &self,
        roots: &[PathBuf],
        quota_bytes: u64,
        protected: &[PathBuf],
    ) -> Vec<PathBuf> {
        let entries = self.scan(roots);
        let total: u64 = entries.iter().map(|e| e.size).sum();

        let mut removed = Vec::new();
        if total <= quota_bytes {
            tracing::debug!("Quota ok: {} of {} bytes used", total, quota_bytes);
            return removed;
        }

        let mut excess = total - quota_bytes;
        tracing::info!(
            "Quota exceeded: {} of {} bytes used, evicting {} bytes",
            total,
            quota_bytes,
            excess
        );

        let protected: Vec<PathBuf> = protected.iter().map(|p| normalize(p)).collect();

        for entry in &entries {
            if is_protected(&entry.path, &protected) {
                tracing::debug!("Skipping active path {:?}", entry.path);
                continue;
            }

            match delete_entry(&entry.path) {
                Ok(()) => {
                    tracing::debug!("Evicted {:?} ({} bytes)", entry.path, entry.size);
                    excess = excess.saturating_sub(entry.size);
                    removed.push(entry.path.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to evict {:?}: {}", entry.path, e);
                }
            }

            if excess == 0 {
                break;
            }
        }

        if excess > 0 {
            tracing::warn!("Quota still exceeded by {} bytes after eviction", excess);
        }

        removed
    }
}

/// Recursive size of a file or directory; unreadable parts count as zero
pub fn dir_size_recursive(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

fn delete_entry(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_protected(entry: &Path, protected: &[PathBuf]) -> bool {
    let entry = normalize(entry);
    protected.iter().any(|p| p.starts_with(&entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; size]).unwrap();
    }

    #[test]
    fn test_under_quota_touches_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_file(&root.join("1000.mp4"), 100);
        write_file(&root.join("2000.mp4"), 100);

        let removed = QuotaEnforcer::new().enforce(&[root.clone()], 200);

        assert!(removed.is_empty());
        assert!(root.join("1000.mp4").exists());
        assert!(root.join("2000.mp4").exists());
    }

    #[test]
    fn test_evicts_minimal_name_prefix() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_file(&root.join("003"), 300);
        write_file(&root.join("001"), 100);
        write_file(&root.join("002").join("clip.mp4"), 200);
        write_file(&root.join("004"), 400);

        // total 1000, quota 750: need 250 -> "001" (100) + "002" (200)
        let removed = QuotaEnforcer::new().enforce(&[root.clone()], 750);

        assert_eq!(removed, vec![root.join("001"), root.join("002")]);
        assert!(!root.join("002").exists());
        assert!(root.join("003").exists());
        assert!(root.join("004").exists());

        let remaining = QuotaEnforcer::new().total_size(&[root]);
        assert!(remaining <= 750);
        assert_eq!(remaining, 700);
    }

    #[test]
    fn test_whole_entry_deleted_even_when_larger_than_needed() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_file(&root.join("a").join("x"), 500);
        write_file(&root.join("a").join("y"), 500);
        write_file(&root.join("b"), 10);

        let removed = QuotaEnforcer::new().enforce(&[root.clone()], 1000);

        assert_eq!(removed, vec![root.join("a")]);
        assert!(root.join("b").exists());
    }

    #[test]
    fn test_entries_from_several_roots_are_merged_by_name() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("us");
        let second = dir.path().join("eu");
        write_file(&first.join("300"), 100);
        write_file(&second.join("100"), 100);
        write_file(&second.join("200"), 100);
        let missing = dir.path().join("missing");

        let removed =
            QuotaEnforcer::new().enforce(&[first.clone(), second.clone(), missing], 150);

        assert_eq!(removed, vec![second.join("100"), second.join("200")]);
        assert!(first.join("300").exists());
    }

    #[test]
    fn test_protected_entry_is_never_deleted() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_file(&root.join("100").join("video0.mp4"), 400);
        write_file(&root.join("200"), 400);
        write_file(&root.join("300"), 400);

        let active = root.join("100").join("video0.mp4");
        let removed =
            QuotaEnforcer::new().enforce_excluding(&[root.clone()], 800, &[active.clone()]);

        assert_eq!(removed, vec![root.join("200")]);
        assert!(active.exists());
    }

    #[test]
    fn test_unsatisfiable_quota_is_best_effort() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_file(&root.join("only"), 100);

        let active = root.join("only");
        let removed = QuotaEnforcer::new().enforce_excluding(&[root.clone()], 10, &[active]);

        assert!(removed.is_empty());
        assert_eq!(QuotaEnforcer::new().total_size(&[root]), 100);
    }

    #[test]
    fn test_dir_size_recursive() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("a").join("b").join("c"), 7);
        write_file(&dir.path().join("a").join("d"), 3);

        assert_eq!(dir_size_recursive(dir.path()), 10);
        assert_eq!(dir_size_recursive(&dir.path().join("missing")), 0);
        assert_eq!(dir_size_recursive(&dir.path().join("a").join("d")), 3);
    }
}
