//! Whole-file atomic replacement via a sibling temp file.

use std::io::{self, Write};
use std::path::Path;

/// Write `data` to a temp file in the same directory as `path`, fsync it, then
/// rename it over `path`. Readers observe either the old or the new contents.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    super::sync_parent(path);
    Ok(())
}
