//! Filesystem primitives used while staging the build context.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Ensure a directory (and all ancestors) exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("cannot create directory {}", path.display()))
}

/// Ensure a file's parent directory exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            ensure_dir(parent)?;
        }
    }
    Ok(())
}

/// Copy `src` to `dest` unless `dest` already holds the same content.
///
/// With `ignore_mtime` the decision is made on size and content alone, so a
/// freshly written scratch file still counts as unchanged when its bytes
/// match. Without it, a differing modification time forces the copy.
///
/// Returns true when a copy actually happened.
pub fn copy_file(src: &Path, dest: &Path, ignore_mtime: bool) -> Result<bool> {
    let should_copy = if !dest.exists() {
        true
    } else {
        let src_meta = std::fs::metadata(src)
            .with_context(|| format!("cannot stat {}", src.display()))?;
        let dest_meta = std::fs::metadata(dest)
            .with_context(|| format!("cannot stat {}", dest.display()))?;

        if !ignore_mtime && src_meta.modified().ok() != dest_meta.modified().ok() {
            true
        } else if src_meta.len() != dest_meta.len() {
            true
        } else if ignore_mtime {
            std::fs::read(src)? != std::fs::read(dest)?
        } else {
            false
        }
    };

    if should_copy {
        ensure_parent_dir(dest)?;
        std::fs::copy(src, dest)
            .with_context(|| format!("copy failed: {} -> {}", src.display(), dest.display()))?;
    }
    Ok(should_copy)
}

/// Recursively copy the contents of `src` into `dest`.
pub fn copy_directory(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("cannot walk {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields children of its root");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            ensure_parent_dir(&target)?;
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("copy failed: {} -> {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

/// Set file permissions (Unix only).
///
/// No-op on non-Unix platforms.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod failed for {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_file_creates_parents() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src.txt");
        let dest = temp.path().join("a/b/c/dest.txt");

        std::fs::write(&src, "content").unwrap();
        assert!(copy_file(&src, &dest, false).unwrap());

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn test_copy_file_skips_identical_content() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src.txt");
        let dest = temp.path().join("dest.txt");

        std::fs::write(&src, "same").unwrap();
        std::fs::write(&dest, "same").unwrap();

        assert!(!copy_file(&src, &dest, true).unwrap());
    }

    #[test]
    fn test_copy_file_replaces_differing_content() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src.txt");
        let dest = temp.path().join("dest.txt");

        std::fs::write(&src, "new!").unwrap();
        std::fs::write(&dest, "old!").unwrap();

        assert!(copy_file(&src, &dest, true).unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new!");
    }

    #[test]
    fn test_copy_directory_recurses() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("tree");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("top.txt"), "top").unwrap();
        std::fs::write(src.join("nested/deep.txt"), "deep").unwrap();

        let dest = temp.path().join("out");
        copy_directory(&src, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("top.txt")).unwrap(), "top");
        assert_eq!(
            std::fs::read_to_string(dest.join("nested/deep.txt")).unwrap(),
            "deep"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_set_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let file = temp.path().join("test.sh");
        std::fs::write(&file, "#!/bin/sh").unwrap();

        set_mode(&file, 0o755).unwrap();

        let perms = std::fs::metadata(&file).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o755);
    }
}
