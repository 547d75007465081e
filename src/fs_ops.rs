// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filesystem primitives used by the executor and by undo

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::plan::ancestors;
use crate::{Result, TidyError};

/// Join a `/`-separated relative path onto `root`
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Move `source` to `destination` without ever replacing an existing entry.
///
/// Every ancestor of both paths below `root` must be a real directory, so
/// a symlink can never carry a move out of the root. Missing parents of
/// the destination are created and removed again if the move does not
/// happen. The rename refuses to replace anything present at the moment
/// it runs, including an entry that arrived after validation.
pub fn move_no_clobber(root: &Path, source: &str, destination: &str) -> Result<()> {
    let src = resolve(root, source);
    let dst = resolve(root, destination);

    check_source_parents(root, source, destination)?;

    let metadata = match fs::symlink_metadata(&src) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TidyError::SourceMissing(source.to_string()));
        }
        Err(e) => return Err(TidyError::access(&src, e)),
    };

    let created = create_parents(root, source, destination)?;

    if let Err(e) = rename_no_replace(&src, &dst, metadata.file_type().is_dir()) {
        remove_created(&created);
        return Err(if e.kind() == ErrorKind::AlreadyExists {
            TidyError::DestinationConflict(destination.to_string())
        } else {
            move_failed(source, destination, e)
        });
    }

    debug!("Moved {} -> {}", source, destination);
    Ok(())
}

fn check_source_parents(root: &Path, source: &str, destination: &str) -> Result<()> {
    let parents: Vec<&str> = ancestors(source).collect();
    for dir in parents.into_iter().rev() {
        let path = resolve(root, dir);
        match fs::symlink_metadata(&path) {
            Ok(m) if m.file_type().is_dir() => {}
            Ok(_) => return Err(outside_root(source, destination, dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TidyError::SourceMissing(source.to_string()));
            }
            Err(e) => return Err(TidyError::access(path, e)),
        }
    }
    Ok(())
}

/// Walk the destination's parents from the root down, creating the missing
/// ones. Returns what was created, shallowest first.
fn create_parents(root: &Path, source: &str, destination: &str) -> Result<Vec<PathBuf>> {
    let parents: Vec<&str> = ancestors(destination).collect();
    let mut created = Vec::new();

    for dir in parents.into_iter().rev() {
        let path = resolve(root, dir);
        let step = match fs::symlink_metadata(&path) {
            Ok(m) if m.file_type().is_dir() => Ok(()),
            Ok(_) => Err(outside_root(source, destination, dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => match fs::create_dir(&path) {
                Ok(()) => {
                    created.push(path);
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && is_real_dir(&path) => Ok(()),
                Err(e) => Err(move_failed(source, destination, e)),
            },
            Err(e) => Err(move_failed(source, destination, e)),
        };

        if let Err(e) = step {
            remove_created(&created);
            return Err(e);
        }
    }

    Ok(created)
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

fn remove_created(created: &[PathBuf]) {
    for dir in created.iter().rev() {
        if let Err(e) = fs::remove_dir(dir) {
            warn!("Could not remove directory {:?}: {}", dir, e);
        }
    }
}

/// Rename that fails with `AlreadyExists` instead of replacing `dst`
fn rename_no_replace(src: &Path, dst: &Path, is_dir: bool) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        match linux::rename_noreplace(src, dst) {
            Err(e) if linux::unsupported(&e) => {
                debug!("RENAME_NOREPLACE unavailable for {:?}: {}", dst, e);
            }
            result => return result,
        }
    }

    if is_dir {
        claim_and_rename(src, dst)
    } else {
        link_and_unlink(src, dst)
    }
}

/// `link` refuses an existing name atomically; the source name is dropped
/// only once the new one exists.
fn link_and_unlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::hard_link(src, dst)?;
    if let Err(e) = fs::remove_file(src) {
        // Both names point at the same file, removing ours loses nothing
        let _ = fs::remove_file(dst);
        return Err(e);
    }
    Ok(())
}

/// Directories where no-replace renames are unavailable: claim the name
/// with an empty directory, then rename over it. Something renamed onto
/// the claimed name between the two steps can still be replaced.
fn claim_and_rename(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir(dst)?;
    if let Err(e) = fs::rename(src, dst) {
        if let Err(cleanup) = fs::remove_dir(dst) {
            warn!("Could not remove placeholder {:?}: {}", dst, cleanup);
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    pub(super) fn rename_noreplace(src: &Path, dst: &Path) -> io::Result<()> {
        let src = c_path(src)?;
        let dst = c_path(dst)?;

        // SAFETY: both pointers come from CStrings that outlive the call
        let rc = unsafe {
            libc::syscall(
                libc::SYS_renameat2,
                libc::AT_FDCWD,
                src.as_ptr(),
                libc::AT_FDCWD,
                dst.as_ptr(),
                libc::RENAME_NOREPLACE,
            )
        };

        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Old kernel, or a filesystem that does not implement the flag
    pub(super) fn unsupported(err: &io::Error) -> bool {
        matches!(
            err.raw_os_error(),
            Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP)
        )
    }

    fn c_path(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

fn outside_root(source: &str, destination: &str, dir: &str) -> TidyError {
    TidyError::MoveFailed {
        source_path: source.to_string(),
        destination: destination.to_string(),
        reason: format!("'{}' is not a directory inside the root", dir),
    }
}

fn move_failed(source: &str, destination: &str, err: io::Error) -> TidyError {
    TidyError::MoveFailed {
        source_path: source.to_string(),
        destination: destination.to_string(),
        reason: err.to_string(),
    }
}

/// Remove directories left empty after `vacated` paths were moved away.
///
/// Candidates are the ancestors of every vacated path, tried deepest
/// first so nested empty directories collapse. The root itself is never
/// removed and non-empty directories are left alone. Returns the relative
/// paths actually removed.
pub fn prune_empty_dirs<'a>(
    root: &Path,
    vacated: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut candidates = BTreeSet::new();
    for path in vacated {
        for ancestor in ancestors(path) {
            candidates.insert(ancestor.to_string());
        }
    }

    let mut ordered: Vec<String> = candidates.into_iter().collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));

    let mut removed = Vec::new();
    for dir in ordered {
        let full = resolve(root, &dir);
        match fs::symlink_metadata(&full) {
            Ok(m) if m.is_dir() => {}
            _ => continue,
        }
        // remove_dir refuses non-empty directories
        if fs::remove_dir(&full).is_ok() {
            debug!("Removed empty directory {}", dir);
            removed.push(dir);
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();

        move_no_clobber(dir.path(), "a.txt", "x/y/a.txt").unwrap();

        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("x/y/a.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_move_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let err = move_no_clobber(dir.path(), "a.txt", "b.txt").unwrap_err();
        assert!(matches!(err, TidyError::DestinationConflict(_)));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_move_refuses_existing_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/f"), "f").unwrap();
        fs::create_dir(dir.path().join("dst")).unwrap();

        let err = move_no_clobber(dir.path(), "src", "dst").unwrap_err();
        assert!(matches!(err, TidyError::DestinationConflict(_)));
        assert!(dir.path().join("src/f").exists());
    }

    #[test]
    fn test_move_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("old/inner")).unwrap();
        fs::write(dir.path().join("old/inner/f.txt"), "f").unwrap();

        move_no_clobber(dir.path(), "old", "archive/new").unwrap();

        assert!(!dir.path().join("old").exists());
        assert!(dir.path().join("archive/new/inner/f.txt").exists());
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_no_clobber(dir.path(), "gone.txt", "x.txt").unwrap_err();
        assert!(matches!(err, TidyError::SourceMissing(_)));
        assert!(!dir.path().join("x.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_concurrent_arrival_is_never_replaced() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        for i in 0..300 {
            let ours = format!("ours{}.txt", i);
            let dest = format!("done{}.txt", i);
            let partial = root.join(format!("download{}.part", i));
            fs::write(root.join(&ours), "ours").unwrap();
            fs::write(&partial, "theirs").unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let other = {
                let barrier = Arc::clone(&barrier);
                let target = root.join(&dest);
                thread::spawn(move || {
                    barrier.wait();
                    fs::rename(partial, target).unwrap();
                })
            };

            barrier.wait();
            let result = move_no_clobber(&root, &ours, &dest);
            other.join().unwrap();

            // Either we got there first and the other writer replaced us,
            // or we found their file and backed off. Theirs always survives.
            assert_eq!(fs::read_to_string(root.join(&dest)).unwrap(), "theirs");
            match result {
                Ok(()) => assert!(!root.join(&ours).exists()),
                Err(TidyError::DestinationConflict(_)) => {
                    assert_eq!(fs::read_to_string(root.join(&ours)).unwrap(), "ours")
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_destination_parent_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join(".link")).unwrap();

        let err = move_no_clobber(dir.path(), "a.txt", ".link/a.txt").unwrap_err();
        assert!(matches!(err, TidyError::MoveFailed { .. }));
        assert!(dir.path().join("a.txt").exists());
        assert!(!outside.path().join("a.txt").exists());

        let err = move_no_clobber(dir.path(), "a.txt", ".link/deeper/a.txt").unwrap_err();
        assert!(matches!(err, TidyError::MoveFailed { .. }));
        assert!(!outside.path().join("deeper").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_source_parent_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join(".link")).unwrap();

        let err = move_no_clobber(dir.path(), ".link/secret.txt", "secret.txt").unwrap_err();
        assert!(matches!(err, TidyError::MoveFailed { .. }));
        assert!(outside.path().join("secret.txt").exists());
        assert!(!dir.path().join("secret.txt").exists());
    }

    #[test]
    fn test_file_in_place_of_parent_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("notes"), "n").unwrap();

        let err = move_no_clobber(dir.path(), "a.txt", "notes/a.txt").unwrap_err();
        assert!(matches!(err, TidyError::MoveFailed { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("notes")).unwrap(), "n");
    }

    #[test]
    fn test_created_parents_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d/f.txt"), "f").unwrap();

        // A directory cannot be moved beneath itself
        let err = move_no_clobber(dir.path(), "d", "d/sub/deeper/d").unwrap_err();
        assert!(matches!(err, TidyError::MoveFailed { .. }));
        assert!(!dir.path().join("d/sub").exists());
        assert!(dir.path().join("d/f.txt").exists());
    }

    #[test]
    fn test_prune_nested_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::write(dir.path().join("keep/f"), "f").unwrap();

        let removed = prune_empty_dirs(dir.path(), ["a/b/c/moved.txt", "keep/moved.txt"]);

        assert_eq!(removed, vec!["a/b/c", "a/b", "a"]);
        assert!(dir.path().join("keep").exists());
        assert!(dir.path().exists());
    }
}
