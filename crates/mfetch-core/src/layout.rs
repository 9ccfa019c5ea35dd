//! On-disk layout under the application root.
//!
//! ```text
//! <root>/models/<artifact_id>/<file_relative_path>       completed file
//! <root>/models/<artifact_id>/<file_relative_path>.tmp   in-progress file
//! <root>/download_state.json                             state journal
//! <root>/download_state.json.bak                         backup after a parse failure
//! ```

use std::path::{Path, PathBuf};

use crate::storage;

pub const MODELS_DIR: &str = "models";
pub const STATE_FILE: &str = "download_state.json";

#[derive(Debug, Clone)]
pub struct ModelLayout {
    root: PathBuf,
}

impl ModelLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root: `~/.local/share/mfetch`.
    pub fn default_root() -> anyhow::Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mfetch")?;
        Ok(xdg_dirs.get_data_home())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    pub fn artifact_dir(&self, artifact_id: &str) -> PathBuf {
        self.models_dir().join(artifact_id)
    }

    /// Completed-file path. `relative` is validated at catalog registration.
    pub fn file_path(&self, artifact_id: &str, relative: &str) -> PathBuf {
        let mut p = self.artifact_dir(artifact_id);
        for part in relative.split('/').filter(|s| !s.is_empty()) {
            p.push(part);
        }
        p
    }

    pub fn temp_file_path(&self, artifact_id: &str, relative: &str) -> PathBuf {
        storage::temp_path(&self.file_path(artifact_id, relative))
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }
}
