//! Filesystem utilities.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

/// Recursively copy a directory, skipping entries whose file name is in `skip`.
pub fn copy_dir_all(src: &Path, dst: &Path, skip: &[&str]) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("failed to create directory: {}", dst.display()))?;

    for entry in fs::read_dir(src)
        .with_context(|| format!("failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        if skip.iter().any(|s| entry.file_name() == OsStr::new(s)) {
            continue;
        }

        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path, skip)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, naming the path on failure.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Lexically normalize a path: drop `.` components and fold `..` into
/// the preceding component. The filesystem is never consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// If `dir` holds exactly one entry and it is a directory, move that
/// directory's contents up into `dir`.
///
/// Archives conventionally wrap everything in `name-version/`.
pub fn hoist_single_dir(dir: &Path) -> Result<()> {
    let entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;

    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if !only.file_type()?.is_dir() {
        return Ok(());
    }

    let inner = only.path();
    let parked = dir.join(".dockyard-hoist");
    fs::rename(&inner, &parked)
        .with_context(|| format!("failed to move {}", inner.display()))?;

    for entry in fs::read_dir(&parked)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(&parked)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_all() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");

        fs::create_dir_all(src.join(".git")).unwrap();
        fs::create_dir_all(src.join("include")).unwrap();
        fs::write(src.join("file.txt"), "content").unwrap();
        fs::write(src.join("include/zlib.h"), "").unwrap();
        fs::write(src.join(".git/HEAD"), "ref").unwrap();

        copy_dir_all(&src, &dst, &[".git"]).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file.txt")).unwrap(), "content");
        assert!(dst.join("include/zlib.h").exists());
        assert!(!dst.join(".git").exists());
    }

    #[test]
    fn test_write_then_read_string() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("meta").join("entry.json");

        write_string(&path, "{}").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "{}");

        let err = read_to_string(&tmp.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read file"));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/work/app/../util")),
            PathBuf::from("/work/util")
        );
        assert_eq!(
            normalize_path(Path::new("/work/./app/")),
            PathBuf::from("/work/app")
        );
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn test_hoist_single_dir() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("zlib-1.3.1");
        fs::create_dir_all(inner.join("src")).unwrap();
        fs::write(inner.join("Dockyard.toml"), "").unwrap();

        hoist_single_dir(tmp.path()).unwrap();

        assert!(tmp.path().join("Dockyard.toml").exists());
        assert!(tmp.path().join("src").is_dir());
        assert!(!inner.exists());
    }

    #[test]
    fn test_hoist_leaves_flat_layout() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("README"), "").unwrap();

        hoist_single_dir(tmp.path()).unwrap();

        assert!(tmp.path().join("src").is_dir());
        assert!(tmp.path().join("README").exists());
    }
}
