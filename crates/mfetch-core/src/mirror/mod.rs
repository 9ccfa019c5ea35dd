//! Ordered mirror list with a per-artifact "last known good" choice.
//!
//! No probing: a mirror is preferred once it delivers bytes for an artifact
//! and rotated away from once it has used up its retry budget. The choice is
//! process-local and seeded from the journal's `chosen_mirror` on resume.

mod url_join;

pub use url_join::join_url;

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

use crate::catalog::FileDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("at least one mirror must be configured")]
    Empty,
    #[error("invalid mirror URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// URL for one file on one mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub mirror: String,
    pub url: String,
}

#[derive(Debug)]
pub struct MirrorPolicy {
    mirrors: Vec<String>,
    chosen: Mutex<HashMap<String, usize>>,
}

impl MirrorPolicy {
    /// Build from an ordered list of base URLs (http or https).
    pub fn new<I, S>(mirrors: I) -> Result<Self, MirrorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Vec::new();
        for m in mirrors {
            let raw: String = m.into();
            let parsed = url::Url::parse(raw.trim()).map_err(|e| MirrorError::InvalidUrl {
                url: raw.clone(),
                message: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(MirrorError::InvalidUrl {
                    url: raw,
                    message: format!("unsupported scheme {}", parsed.scheme()),
                });
            }
            list.push(raw.trim().trim_end_matches('/').to_string());
        }
        if list.is_empty() {
            return Err(MirrorError::Empty);
        }
        Ok(Self {
            mirrors: list,
            chosen: Mutex::new(HashMap::new()),
        })
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// Chosen mirror for the artifact (or the first one) joined with the file's URL fragment.
    pub fn resolve(&self, artifact_id: &str, file: &FileDescriptor) -> ResolvedUrl {
        let idx = self.lock().get(artifact_id).copied().unwrap_or(0);
        let mirror = self.mirrors[idx].clone();
        let url = join_url(&mirror, &file.url_path);
        ResolvedUrl { mirror, url }
    }

    /// Advance the artifact's choice to the next mirror, wrapping around.
    /// Returns the newly chosen mirror.
    pub fn rotate(&self, artifact_id: &str) -> String {
        let mut chosen = self.lock();
        let next = chosen
            .get(artifact_id)
            .map(|i| (i + 1) % self.mirrors.len())
            .unwrap_or(1 % self.mirrors.len());
        chosen.insert(artifact_id.to_string(), next);
        let mirror = self.mirrors[next].clone();
        tracing::debug!(artifact = artifact_id, mirror = %mirror, "rotated mirror");
        mirror
    }

    /// Pin `mirror` for later files of the artifact. Unknown mirrors are ignored.
    pub fn prefer(&self, artifact_id: &str, mirror: &str) -> bool {
        let Some(idx) = self.index_of(mirror) else {
            return false;
        };
        let previous = self.lock().insert(artifact_id.to_string(), idx);
        if previous != Some(idx) {
            tracing::debug!(artifact = artifact_id, mirror, "preferring mirror");
        }
        true
    }

    /// Currently pinned mirror, if any.
    pub fn chosen(&self, artifact_id: &str) -> Option<String> {
        self.lock()
            .get(artifact_id)
            .map(|&i| self.mirrors[i].clone())
    }

    pub fn forget(&self, artifact_id: &str) {
        self.lock().remove(artifact_id);
    }

    fn index_of(&self, mirror: &str) -> Option<usize> {
        let mirror = mirror.trim_end_matches('/');
        self.mirrors.iter().position(|m| m == mirror)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.chosen.lock()
    }
}
