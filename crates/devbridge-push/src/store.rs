//! Push token registry
//!
//! The registry is a single human-readable JSON file holding a flat list of
//! [`PushToken`] records, rewritten wholesale on every mutation. Writes go to
//! a sibling temp file that is renamed over the original.
//!
//! There is no locking: two overlapping read-modify-write cycles can lose an
//! update. One bridge process is expected to own the file.

use devbridge_proto::PushToken;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::PushError;

/// File-backed token registry, unique by `device_id`
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.devbridge/push-tokens.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".devbridge").join("push-tokens.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored tokens. Missing or unreadable storage yields an empty list.
    pub fn load(&self) -> Vec<PushToken> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read token store {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<PushToken>>(&json) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Ignoring corrupt token store {:?}: {}", self.path, e);
                Vec::new()
            }
        }
    }

    /// Replace the whole registry
    pub fn save(&self, tokens: &[PushToken]) -> Result<(), PushError> {
        let json = serde_json::to_string_pretty(tokens)?;
        let store_err = |source| PushError::Store {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(store_err)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(store_err)?;
        fs::rename(&tmp, &self.path).map_err(store_err)?;

        debug!("Saved {} push token(s) to {:?}", tokens.len(), self.path);
        Ok(())
    }

    /// Insert or replace the entry for `token.device_id`
    pub fn upsert(&self, token: PushToken) -> Result<(), PushError> {
        let mut tokens = self.load();
        match tokens.iter_mut().find(|t| t.device_id == token.device_id) {
            Some(existing) => *existing = token,
            None => tokens.push(token),
        }
        self.save(&tokens)
    }

    /// Remove the entry for `device_id`; returns whether one existed
    pub fn remove(&self, device_id: &str) -> Result<bool, PushError> {
        let mut tokens = self.load();
        let before = tokens.len();
        tokens.retain(|t| t.device_id != device_id);
        if tokens.len() == before {
            return Ok(false);
        }
        self.save(&tokens)?;
        Ok(true)
    }

    /// Drop every entry whose push token is in `invalid`; returns how many were removed
    pub fn remove_tokens(&self, invalid: &[String]) -> Result<usize, PushError> {
        if invalid.is_empty() {
            return Ok(0);
        }
        let mut tokens = self.load();
        let before = tokens.len();
        tokens.retain(|t| !invalid.contains(&t.token));
        let removed = before - tokens.len();
        if removed > 0 {
            self.save(&tokens)?;
        }
        Ok(removed)
    }
}
