//! On-disk cache of extracted snare.js configurations.
//!
//! Entries are keyed by script URL and stored together as one pretty-printed
//! JSON file, so a config only has to be fetched and extracted once per
//! deployment.

use crate::error::{Result, SnareError};
use crate::models::SnareConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A config as it was extracted from one script URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedConfig {
    pub script_url: String,
    pub fetched_at: DateTime<Utc>,
    pub config: SnareConfig,
}

impl CachedConfig {
    pub fn new(script_url: impl Into<String>, config: SnareConfig) -> Self {
        Self {
            script_url: script_url.into(),
            fetched_at: Utc::now(),
            config,
        }
    }

    /// Whether the entry is at most `max_age` old at `now`.
    ///
    /// Entries stamped in the future count as fresh.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(age) => age <= max_age,
            Err(_) => true,
        }
    }
}

/// JSON file holding [`CachedConfig`] entries.
#[derive(Debug, Clone)]
pub struct ConfigCache {
    path: PathBuf,
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigCache {
    /// Cache in the platform cache directory.
    pub fn new() -> Self {
        let cache_dir = directories::ProjectDirs::from("com", "ioblackbox", "ioblackbox")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".cache"));

        Self {
            path: cache_dir.join("configs.json"),
        }
    }

    /// Cache at a custom file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the entry for a script URL.
    pub fn get(&self, script_url: &str) -> Result<Option<CachedConfig>> {
        let mut entries = self.load()?;
        Ok(entries.remove(script_url))
    }

    /// Store an entry, replacing any previous one for the same URL.
    ///
    /// A corrupt cache file is discarded and rewritten.
    pub fn put(&self, entry: CachedConfig) -> Result<()> {
        let mut entries = self.load_or_reset()?;
        entries.insert(entry.script_url.clone(), entry);
        self.save(&entries)
    }

    /// Drop the entry for a script URL. Returns whether one existed.
    pub fn remove(&self, script_url: &str) -> Result<bool> {
        let mut entries = self.load_or_reset()?;
        let existed = entries.remove(script_url).is_some();
        if existed {
            self.save(&entries)?;
        }
        Ok(existed)
    }

    fn load(&self) -> Result<BTreeMap<String, CachedConfig>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn load_or_reset(&self) -> Result<BTreeMap<String, CachedConfig>> {
        match self.load() {
            Err(SnareError::Json(e)) => {
                tracing::warn!("Discarding corrupt config cache {:?}: {}", self.path, e);
                Ok(BTreeMap::new())
            }
            Err(SnareError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!("Discarding unreadable config cache {:?}: {}", self.path, e);
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    /// Write through a temp file in the same directory and rename it into
    /// place, so readers never see a partial file.
    fn save(&self, entries: &BTreeMap<String, CachedConfig>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_string_pretty(entries)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.persist(&self.path).map_err(|e| e.error)?;
        tracing::debug!("Saved {} config(s) to cache: {:?}", entries.len(), self.path);
        Ok(())
    }
}
