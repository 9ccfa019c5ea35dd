//! Artifact and file descriptors.

use serde::{Deserialize, Serialize};

/// Files larger than this may carry per-chunk hashes.
pub const CHUNK_HASH_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Uniform-size chunk hashes for a large file. Carried for completeness;
/// only the whole-file hash is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHashes {
    pub chunk_size: u64,
    pub sha256: Vec<String>,
}

/// One file of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Path relative to the artifact directory (`/`-separated).
    pub path: String,
    /// Fragment appended to a mirror base URL.
    pub url_path: String,
    /// Expected size in bytes (0 = unknown).
    #[serde(default)]
    pub size: u64,
    /// Expected whole-file SHA-256 (hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_hashes: Option<ChunkHashes>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, url_path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            url_path: url_path.into(),
            size,
            sha256: None,
            chunk_hashes: None,
        }
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }
}

/// A named unit the caller downloads. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: Vec<FileDescriptor>,
    #[serde(default)]
    pub optional: Vec<FileDescriptor>,
}

impl Artifact {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn with_required(mut self, file: FileDescriptor) -> Self {
        self.required.push(file);
        self
    }

    pub fn with_optional(mut self, file: FileDescriptor) -> Self {
        self.optional.push(file);
        self
    }

    /// Sum of all declared sizes. Estimate for display only.
    pub fn expected_total_bytes(&self) -> u64 {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(|f| f.size)
            .sum()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.required.iter().chain(self.optional.iter())
    }

    pub fn find_file(&self, relative: &str) -> Option<&FileDescriptor> {
        self.files().find(|f| f.path == relative)
    }
}

/// Checks that `relative` stays inside the artifact directory: not empty, not
/// absolute, no `.`/`..` components, no backslashes or NUL.
pub fn is_safe_relative_path(relative: &str) -> bool {
    if relative.is_empty() || relative.starts_with('/') || relative.contains('\\') || relative.contains('\0') {
        return false;
    }
    relative
        .split('/')
        .all(|part| !part.is_empty() && part != "." && part != "..")
}
