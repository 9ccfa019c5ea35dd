//! Registry of downloadable artifacts.
//!
//! Built once at startup (from the built-in table or a TOML catalog file) and
//! read-only afterwards, so it needs no locking.

mod artifact;
mod builtin;
mod file;

pub use artifact::{
    is_safe_relative_path, Artifact, ChunkHashes, FileDescriptor, CHUNK_HASH_THRESHOLD,
};
pub use builtin::builtin_artifacts;

use std::collections::HashMap;

use crate::layout::ModelLayout;

/// Installed-size tolerance for `is_installed` (±10%).
const SIZE_TOLERANCE: f64 = 0.10;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("artifact id must not be empty")]
    EmptyId,
    #[error("artifact {0} registered twice")]
    Duplicate(String),
    #[error("artifact {id} has no required files")]
    NoRequiredFiles { id: String },
    #[error("artifact {id}: unsafe file path {path:?}")]
    UnsafePath { id: String, path: String },
    #[error("artifact {id}: file {path:?} listed twice")]
    DuplicateFile { id: String, path: String },
    #[error("catalog file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    artifacts: HashMap<String, Artifact>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a static table.
    pub fn from_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for a in artifacts {
            catalog.register(a)?;
        }
        Ok(catalog)
    }

    /// The built-in table shipped with the application.
    pub fn builtin() -> Self {
        // The built-in table is validated by its unit test.
        let mut catalog = Self::new();
        for a in builtin_artifacts() {
            if let Err(e) = catalog.register(a) {
                tracing::error!("built-in catalog entry rejected: {}", e);
            }
        }
        catalog
    }

    pub fn register(&mut self, artifact: Artifact) -> Result<(), CatalogError> {
        validate(&artifact)?;
        if self.artifacts.contains_key(&artifact.id) {
            return Err(CatalogError::Duplicate(artifact.id));
        }
        self.artifacts.insert(artifact.id.clone(), artifact);
        Ok(())
    }

    /// All registered artifacts, in no particular order.
    pub fn list(&self) -> Vec<&Artifact> {
        self.artifacts.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// True iff every required file exists at its target path with a size
    /// within ±10% of the declared size. Hashes are not checked here.
    pub fn is_installed(&self, id: &str, layout: &ModelLayout) -> bool {
        let Some(artifact) = self.get(id) else {
            return false;
        };
        artifact.required.iter().all(|f| {
            let path = layout.file_path(&artifact.id, &f.path);
            match std::fs::metadata(&path) {
                Ok(m) if m.is_file() => size_within_tolerance(m.len(), f.size),
                _ => false,
            }
        })
    }
}

fn size_within_tolerance(actual: u64, expected: u64) -> bool {
    if expected == 0 {
        return true;
    }
    let diff = actual.abs_diff(expected) as f64;
    diff <= expected as f64 * SIZE_TOLERANCE
}

fn validate(artifact: &Artifact) -> Result<(), CatalogError> {
    if artifact.id.trim().is_empty() {
        return Err(CatalogError::EmptyId);
    }
    if !is_safe_relative_path(&artifact.id) || artifact.id.contains('/') {
        return Err(CatalogError::UnsafePath {
            id: artifact.id.clone(),
            path: artifact.id.clone(),
        });
    }
    if artifact.required.is_empty() {
        return Err(CatalogError::NoRequiredFiles {
            id: artifact.id.clone(),
        });
    }
    let mut seen = std::collections::HashSet::new();
    for f in artifact.files() {
        if !is_safe_relative_path(&f.path) {
            return Err(CatalogError::UnsafePath {
                id: artifact.id.clone(),
                path: f.path.clone(),
            });
        }
        if !seen.insert(f.path.as_str()) {
            return Err(CatalogError::DuplicateFile {
                id: artifact.id.clone(),
                path: f.path.clone(),
            });
        }
        if f.chunk_hashes.is_some() && f.size <= CHUNK_HASH_THRESHOLD {
            tracing::debug!(artifact = %artifact.id, file = %f.path, "chunk hashes declared for a small file");
        }
    }
    Ok(())
}
