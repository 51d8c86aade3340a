use std::io;
use std::path::{Path, PathBuf};

/// Check whether a path exists without blocking the runtime.
///
/// Any metadata error (including permission errors) counts as "does not exist".
pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub async fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Path of the temporary sibling used while producing `path`.
///
/// The file lives in the same directory so the final rename never crosses
/// filesystems. The process id keeps concurrent processes apart.
#[must_use]
pub fn temp_sibling(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ))
}

/// Move a fully written temp file onto its final path.
///
/// Readers either see no file or the complete file, never a partial write.
///
/// # Errors
/// Returns an error if the rename fails. The temp file is removed on failure.
pub async fn promote(temp_path: &Path, path: &Path) -> io::Result<()> {
    match tokio::fs::rename(temp_path, path).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // On Windows, rename can fail if target exists. Try copy + remove as fallback.
            if cfg!(windows) {
                tokio::fs::copy(temp_path, path).await?;
                let _ = tokio::fs::remove_file(temp_path).await;
                Ok(())
            } else {
                let _ = tokio::fs::remove_file(temp_path).await;
                Err(e)
            }
        }
    }
}

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = temp_sibling(path);
    if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    promote(&temp_path, path).await
}
