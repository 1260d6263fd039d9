use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails, which covers
/// upload temp directories that live on a different device than the output.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    // Fast path: atomic rename
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    // Slow path: copy then remove original
    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Creates `path` and all of its parents. Safe to call concurrently.
pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    // create_dir_all treats "already exists" as success, including when
    // another process wins the race to create it.
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Ensures the parent directory of `path` exists.
pub fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}

/// Writes `content` to `path` so readers never observe a partial file.
///
/// The bytes go to a hidden sibling (`.<name>.tmp`) first, are flushed,
/// then renamed over `path`. The sibling name never ends in `.json`, so
/// queue scans skip it.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let tmp_path = temp_sibling(path);

    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Removes a file, logging instead of failing. Returns whether the file was
/// removed by this call.
pub fn remove_best_effort(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("Nothing to remove at {}", path.display());
            false
        }
        Err(e) => {
            log::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Size in bytes of the file at `path`.
pub fn file_size(path: &Path) -> Result<u64, StorageError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("upload.bin");
        let dst = temp_dir.path().join("moved.bin");
        std::fs::write(&src, b"payload").unwrap();

        move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_move_missing_source_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = move_file(
            &temp_dir.path().join("nonexistent.mov"),
            &temp_dir.path().join("out.mov"),
        );

        match result {
            Err(StorageError::MoveFile { from, .. }) => {
                assert!(from.to_string_lossy().contains("nonexistent.mov"));
            }
            _ => panic!("Expected MoveFile error"),
        }
    }

    #[test]
    fn test_ensure_directory_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("leads/abc/deep");

        ensure_directory(&nested).unwrap();
        ensure_directory(&nested).unwrap();

        assert!(nested.is_dir());
    }

    #[test]
    fn test_ensure_directory_concurrent() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c/d");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = nested.clone();
                std::thread::spawn(move || ensure_directory(&path))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert!(nested.is_dir());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("job.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();
        write_atomic(&path, b"{\"a\":2}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");

        // No temp siblings left behind
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_missing_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing/job.json");

        match write_atomic(&path, b"{}") {
            Err(StorageError::WriteFile { path: p, .. }) => assert_eq!(p, path),
            _ => panic!("Expected WriteFile error"),
        }
    }

    #[test]
    fn test_remove_best_effort() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("input.heic");
        std::fs::write(&path, b"x").unwrap();

        assert!(remove_best_effort(&path));
        assert!(!path.exists());
        // Already gone: logged, not fatal
        assert!(!remove_best_effort(&path));
    }

    #[test]
    fn test_file_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.jpg");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();

        assert_eq!(file_size(&path).unwrap(), 1234);
        assert!(file_size(&temp_dir.path().join("nope")).is_err());
    }
}
