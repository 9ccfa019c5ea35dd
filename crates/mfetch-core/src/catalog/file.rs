//! TOML catalog files.
//!
//! ```toml
//! [[artifact]]
//! id = "tiny-model"
//! description = "Tiny test model"
//!
//! [[artifact.required]]
//! path = "model.gguf"
//! url_path = "org/tiny/resolve/main/model.gguf"
//! size = 1048576
//! sha256 = "…"
//! ```

use serde::Deserialize;
use std::path::Path;

use super::{Artifact, Catalog, CatalogError};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "artifact")]
    artifacts: Vec<Artifact>,
}

impl Catalog {
    /// Parse a catalog from TOML text.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, CatalogError> {
        let parsed: CatalogFile = toml::from_str(text).map_err(|e| CatalogError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Self::from_artifacts(parsed.artifacts)
    }

    /// Load a catalog file from disk.
    pub fn load_toml(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }
}
