//! Atomic file writes, so readers never observe a half-written manifest or cache entry

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use swipe_core::{Error, Result};
use uuid::Uuid;

/// Write `content` to `path` through a sibling temporary file and a rename.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| Error::file_system(parent, "create parent directory", e))?;

    let temp_path = temp_sibling(parent, path);
    if let Err(e) = write_synced(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::file_system(path, "atomic rename", e)
    })
}

/// Write pretty-printed JSON followed by a newline
pub fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::json(format!("serializing {}", path.display()), e))?;
    content.push(b'\n');
    write_atomic(path, &content)
}

fn temp_sibling(parent: &Path, path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent.join(format!(".{stem}.{}.tmp", Uuid::new_v4()))
}

fn write_synced(temp_path: &Path, content: &[u8]) -> Result<()> {
    let mut file =
        File::create(temp_path).map_err(|e| Error::file_system(temp_path, "create", e))?;
    file.write_all(content)
        .map_err(|e| Error::file_system(temp_path, "write", e))?;
    file.sync_all()
        .map_err(|e| Error::file_system(temp_path, "sync", e))
}
