//! File-backed page cache for model responses
//!
//! One JSON file per (dataset id, page size, page index) at
//! `<root>/<dataset_id>/pages_ps<page_size>/<index %05d>.json`. Entries
//! are content-addressed: the stored settings fingerprint and exemplar
//! fingerprint list must match the current page exactly or the read is
//! a miss. Misses are never errors; a stale or corrupt file simply
//! falls through to a fresh model call that overwrites it.
//!
//! Writes go to a temporary sibling file first and are renamed into
//! place, so a crash mid-write never leaves a readable half-entry.
//! Rename is also the only cross-process coordination: concurrent runs
//! racing on the same page both write valid entries and the last
//! rename wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Decision;

/// Bump when the entry layout changes; older entries become misses
pub const SCHEMA_VERSION: u32 = 2;

/// On-disk cache entry for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCacheEntry {
    pub schema_version: u32,
    pub dataset_id: String,
    pub page_size: usize,
    pub page_index: usize,
    pub settings_fingerprint: String,
    pub exemplar_fingerprints: Vec<String>,
    pub decisions: Vec<Decision>,
}

/// Identity of one page for cache addressing
#[derive(Debug, Clone)]
pub struct PageKey {
    pub dataset_id: String,
    pub page_size: usize,
    pub page_index: usize,
    pub settings_fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct PageCache {
    root: PathBuf,
}

impl PageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding all pages of one dataset at one page size
    pub fn pages_dir(&self, dataset_id: &str, page_size: usize) -> PathBuf {
        self.root
            .join(dataset_id)
            .join(format!("pages_ps{page_size}"))
    }

    fn entry_path(&self, key: &PageKey) -> PathBuf {
        self.pages_dir(&key.dataset_id, key.page_size)
            .join(format!("{:05}.json", key.page_index))
    }

    /// Read the cached decisions for a page, if a valid entry exists
    ///
    /// Returns `None` for absent, corrupt, or mismatched entries.
    pub async fn read(
        &self,
        key: &PageKey,
        exemplar_fingerprints: &[String],
    ) -> Result<Option<Vec<Decision>>> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: PageCacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry, treating as miss");
                return Ok(None);
            }
        };

        if entry.schema_version != SCHEMA_VERSION
            || entry.dataset_id != key.dataset_id
            || entry.page_size != key.page_size
            || entry.page_index != key.page_index
            || entry.settings_fingerprint != key.settings_fingerprint
            || entry.exemplar_fingerprints != exemplar_fingerprints
        {
            debug!(path = %path.display(), "cache entry identity mismatch, treating as miss");
            return Ok(None);
        }

        if entry.decisions.len() != exemplar_fingerprints.len() {
            debug!(path = %path.display(), "cache entry decision count mismatch, treating as miss");
            return Ok(None);
        }

        Ok(Some(entry.decisions))
    }

    /// Atomically persist a page's decisions
    pub async fn write(
        &self,
        key: &PageKey,
        exemplar_fingerprints: &[String],
        decisions: &[Decision],
    ) -> Result<()> {
        let path = self.entry_path(key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let entry = PageCacheEntry {
            schema_version: SCHEMA_VERSION,
            dataset_id: key.dataset_id.clone(),
            page_size: key.page_size,
            page_index: key.page_index,
            settings_fingerprint: key.settings_fingerprint.clone(),
            exemplar_fingerprints: exemplar_fingerprints.to_vec(),
            decisions: decisions.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = path.with_extension(format!("json.tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), decisions = decisions.len(), "wrote page cache entry");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
