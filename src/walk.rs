//! Traversal Walker: an explicit depth-first stack over the directory tree (not
//! recursion), with a canonicalized-directory guard against symlink cycles.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::warn;

use crate::cancellation::CancellationToken;
use crate::pattern::PatternService;
use crate::types::TraversalCounters;

fn is_os_hidden_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(".DS_Store") | Some(".AppleDouble") | Some(".LSOverride") => true,
        Some("Thumbs.db") | Some("ehthumbs.db") | Some("Desktop.ini") | Some("$RECYCLE.BIN") => {
            true
        }
        Some(".directory") => true,
        Some(name) => name.starts_with("._") || name.starts_with(".Trash-"),
        None => false,
    }
}

/// Name-based exclusion rules, separate from the glob/regex Pattern Service:
/// an exact-name denylist for directories and one for files.
#[derive(Clone, Default)]
pub struct NameExclusions {
    pub folders: HashSet<String>,
    pub files: HashSet<String>,
}

/// Spawn the walker thread. Sends every included file's absolute path on `path_tx`
/// and updates `counters` as it goes; drops `path_tx` (closing the channel) when done.
#[allow(clippy::too_many_arguments)]
pub fn spawn_walk_thread(
    root: PathBuf,
    patterns: Arc<PatternService>,
    names: NameExclusions,
    follow_links: bool,
    exclude_paths: Vec<PathBuf>,
    path_tx: Sender<PathBuf>,
    counters: Arc<Mutex<TraversalCounters>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        walk(
            &root,
            &patterns,
            &names,
            follow_links,
            &exclude_paths,
            &path_tx,
            &counters,
            &cancel,
        );
    })
}

#[allow(clippy::too_many_arguments)]
fn walk(
    root: &Path,
    patterns: &PatternService,
    names: &NameExclusions,
    follow_links: bool,
    exclude_paths: &[PathBuf],
    path_tx: &Sender<PathBuf>,
    counters: &Arc<Mutex<TraversalCounters>>,
    cancel: &CancellationToken,
) {
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();
    if let Ok(canon) = root.canonicalize() {
        visited_dirs.insert(canon);
    }

    while let Some(dir) = stack.pop() {
        if cancel.is_cancellation_requested() {
            break;
        }

        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!("Permission denied or error accessing {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in read_dir {
            if cancel.is_cancellation_requested() {
                return;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();

            if exclude_paths.iter().any(|p| p == &path) || is_os_hidden_file(&path) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    warn!("Error reading file type for {}: {}", path.display(), e);
                    continue;
                }
            };

            let is_dir = if file_type.is_symlink() {
                if !follow_links {
                    continue;
                }
                let Ok(target_meta) = fs::metadata(&path) else {
                    continue;
                };
                target_meta.is_dir()
            } else if file_type.is_dir() {
                true
            } else if file_type.is_file() {
                false
            } else {
                continue;
            };

            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let path_str = path.to_string_lossy();
            let excluded = if is_dir {
                names.folders.contains(name)
            } else {
                names.files.contains(name)
            } || (!patterns.is_empty() && patterns.is_excluded(name, &path_str));

            if excluded {
                // A pruned directory is silently dropped: it and everything beneath it
                // are never counted. Only an excluded file increments `excluded`.
                if !is_dir {
                    counters.lock().unwrap().excluded += 1;
                }
                continue;
            }

            if is_dir {
                if file_type.is_symlink() {
                    if let Ok(canon) = path.canonicalize()
                        && visited_dirs.insert(canon)
                    {
                        stack.push(path);
                    }
                } else {
                    stack.push(path);
                }
            } else {
                counters.lock().unwrap().included += 1;
                if path_tx.send(path).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::fs as stdfs;
    use tempfile::tempdir;

    fn run_walk(root: &Path, patterns: Vec<String>, follow_links: bool) -> (Vec<PathBuf>, TraversalCounters) {
        run_walk_with_names(root, patterns, NameExclusions::default(), follow_links)
    }

    fn run_walk_with_names(
        root: &Path,
        patterns: Vec<String>,
        names: NameExclusions,
        follow_links: bool,
    ) -> (Vec<PathBuf>, TraversalCounters) {
        let (tx, rx) = unbounded();
        let counters = Arc::new(Mutex::new(TraversalCounters::default()));
        let cancel = crate::cancellation::CancellationTokenSource::new().token();
        walk(
            root,
            &PatternService::new(patterns),
            &names,
            follow_links,
            &[],
            &tx,
            &counters,
            &cancel,
        );
        drop(tx);
        let paths: Vec<PathBuf> = rx.into_iter().collect();
        let counters = Arc::try_unwrap(counters).unwrap().into_inner().unwrap();
        (paths, counters)
    }

    #[test]
    fn walks_nested_files() {
        let dir = tempdir().unwrap();
        stdfs::write(dir.path().join("a.txt"), "a").unwrap();
        stdfs::create_dir(dir.path().join("sub")).unwrap();
        stdfs::write(dir.path().join("sub/b.txt"), "b").unwrap();

        let (paths, counters) = run_walk(dir.path(), vec![], false);
        assert_eq!(paths.len(), 2);
        assert_eq!(counters.included, 2);
        assert_eq!(counters.excluded, 0);
    }

    #[test]
    fn excluded_directory_is_pruned_and_not_counted() {
        let dir = tempdir().unwrap();
        stdfs::create_dir(dir.path().join("node_modules")).unwrap();
        stdfs::write(dir.path().join("node_modules/dep.js"), "x").unwrap();
        stdfs::write(dir.path().join("keep.txt"), "k").unwrap();

        let (paths, counters) = run_walk(dir.path(), vec!["node_modules".to_string()], false);
        assert_eq!(paths.len(), 1);
        assert_eq!(counters.included, 1);
        // The pruned directory itself is not counted; only excluded files are.
        assert_eq!(counters.excluded, 0);
    }

    #[test]
    fn hidden_os_files_are_skipped_silently() {
        let dir = tempdir().unwrap();
        stdfs::write(dir.path().join(".DS_Store"), "x").unwrap();
        stdfs::write(dir.path().join("visible.txt"), "v").unwrap();

        let (paths, counters) = run_walk(dir.path(), vec![], false);
        assert_eq!(paths.len(), 1);
        assert_eq!(counters.excluded, 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_does_not_hang() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        stdfs::create_dir(&sub).unwrap();
        std::os::unix::fs::symlink(dir.path(), sub.join("loop")).unwrap();
        stdfs::write(sub.join("file.txt"), "f").unwrap();

        let (paths, _counters) = run_walk(dir.path(), vec![], true);
        assert!(paths.iter().any(|p| p.ends_with("file.txt")));
    }

    #[test]
    fn excluded_folder_by_exact_name_is_pruned() {
        let dir = tempdir().unwrap();
        stdfs::create_dir(dir.path().join("vendor")).unwrap();
        stdfs::write(dir.path().join("vendor/dep.rs"), "x").unwrap();
        stdfs::write(dir.path().join("keep.txt"), "k").unwrap();

        let names = NameExclusions {
            folders: HashSet::from(["vendor".to_string()]),
            files: HashSet::new(),
        };
        let (paths, counters) = run_walk_with_names(dir.path(), vec![], names, false);
        assert_eq!(paths.len(), 1);
        assert_eq!(counters.included, 1);
        assert_eq!(counters.excluded, 0);
    }

    #[test]
    fn excluded_file_by_exact_name_counts_as_excluded_not_included() {
        let dir = tempdir().unwrap();
        stdfs::write(dir.path().join("secret.env"), "x").unwrap();
        stdfs::write(dir.path().join("keep.txt"), "k").unwrap();

        let names = NameExclusions {
            folders: HashSet::new(),
            files: HashSet::from(["secret.env".to_string()]),
        };
        let (paths, counters) = run_walk_with_names(dir.path(), vec![], names, false);
        assert_eq!(paths.len(), 1);
        assert_eq!(counters.included, 1);
        assert_eq!(counters.excluded, 1);
    }
}
