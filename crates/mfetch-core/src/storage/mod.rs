//! Disk I/O and file lifecycle.
//!
//! In-progress files live next to their target with a `.tmp` suffix and are
//! only ever appended to; their length is the resume offset. Completed files
//! are published by fsync + rename. The state journal is rewritten through a
//! sibling temp file so a crash never leaves a half-written document.

mod atomic;
mod writer;

pub use atomic::atomic_write;
pub use writer::TempFileWriter;

use std::io;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path for the temp file: appends `.tmp` to the final path (e.g. `model.gguf` → `model.gguf.tmp`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Byte length of `path`, or 0 when it does not exist.
pub fn file_len(path: &Path) -> io::Result<u64> {
    match std::fs::metadata(path) {
        Ok(m) => Ok(m.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Remove a file if present. Returns whether something was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Fsync `tmp` and rename it over `final_path`.
pub fn finalize(tmp: &Path, final_path: &Path) -> io::Result<()> {
    std::fs::File::open(tmp)?.sync_all()?;
    std::fs::rename(tmp, final_path)?;
    sync_parent(final_path);
    Ok(())
}

/// Best-effort directory fsync so the rename itself is durable.
pub(crate) fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                if let Err(e) = dir.sync_all() {
                    tracing::debug!(dir = %parent.display(), "directory fsync failed: {}", e);
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
