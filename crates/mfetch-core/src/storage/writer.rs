//! Append-only writer for in-progress download files.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writer for a `.tmp` download file. Bytes are only appended, so the file
/// length always equals the number of bytes safely written.
pub struct TempFileWriter {
    file: File,
    temp_path: PathBuf,
    len: u64,
}

impl TempFileWriter {
    /// Open (or create) the temp file in append mode, creating parent dirs.
    pub fn open_append(temp_path: &Path) -> io::Result<Self> {
        if let Some(parent) = temp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options().create(true).append(true).open(temp_path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            temp_path: temp_path.to_path_buf(),
            len,
        })
    }

    /// Current length of the file, i.e. the resume offset.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a chunk. The whole chunk is written or an error is returned.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    /// Drop all bytes written so far (origin ignored our range request).
    pub fn truncate(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.len = 0;
        Ok(())
    }

    /// Sync file data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}
