//! Best-effort path canonicalisation.
//!
//! Handlers are keyed by canonical path so that two requests for the same
//! underlying file share one handler, even through symlinks or `..`/`.`
//! segments. Files about to be created for writing do not exist yet, so
//! full canonicalisation is not always possible: the longest existing
//! prefix is canonicalised and the non-existent suffix is appended verbatim.

use std::path::{Path, PathBuf};

/// Canonicalise `path` as far as the filesystem allows.
///
/// If the whole path exists, this is [`std::fs::canonicalize`]. Otherwise
/// the longest existing ancestor is canonicalised (resolving symlinks and
/// collapsing `..`/`.` within it) and the rest of the path is appended
/// unchanged. A relative path is first made absolute against the current
/// directory.
///
/// Deterministic for the lifetime of the process, barring filesystem
/// mutations outside our control. Hardlinks are not detected: two distinct
/// canonical paths are distinct keys even if they name the same inode.
pub fn weakly_canonical(path: &Path) -> PathBuf {
    let absolute = absolutize(path);

    if let Ok(resolved) = std::fs::canonicalize(&absolute) {
        return resolved;
    }

    // The first ancestor yielded is the path itself, which we just failed
    // to canonicalise.
    for ancestor in absolute.ancestors().skip(1) {
        if let Ok(head) = std::fs::canonicalize(ancestor) {
            let Ok(tail) = absolute.strip_prefix(ancestor) else {
                continue;
            };
            return head.join(tail);
        }
    }

    absolute
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_path_resolves_dot_dot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();

        let parent = dir.path().parent().unwrap();
        let roundabout = parent
            .join("..")
            .join(parent.file_name().unwrap())
            .join(dir.path().file_name().unwrap())
            .join("f");
        assert_ne!(roundabout, file);
        assert_eq!(weakly_canonical(&roundabout), weakly_canonical(&file));
    }

    #[test]
    fn symlink_resolves_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        std::fs::write(&target, b"x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(weakly_canonical(&link), weakly_canonical(&target));
    }

    #[test]
    fn missing_suffix_is_appended_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not").join("yet");

        let canonical = weakly_canonical(&missing);
        assert_eq!(
            canonical,
            weakly_canonical(dir.path()).join("not").join("yet")
        );
    }

    #[test]
    fn canonicalisation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("f");
        std::fs::write(&existing, b"x").unwrap();
        let missing = dir.path().join("nope");

        for path in [&existing, &missing] {
            let once = weakly_canonical(path);
            assert_eq!(weakly_canonical(&once), once);
        }
    }

    #[test]
    fn relative_path_becomes_absolute() {
        let relative = Path::new("some/relative/file");
        assert!(weakly_canonical(relative).is_absolute());
    }
}
