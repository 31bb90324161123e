use crate::picsort_core::error::{PicsortError, Result};
use crate::picsort_core::exif::ExtractedMetadata;
use crate::picsort_core::manifest::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

const CACHE_VERSION: u32 = 1;

/// Last known state of one file and what was extracted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    pub size: u64,
    pub metadata: ExtractedMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<PathBuf, CacheEntry>,
}

/// Extracted metadata keyed by source path, persisted between builds.
#[derive(Debug)]
pub struct ManifestCache {
    path: PathBuf,
    entries: BTreeMap<PathBuf, CacheEntry>,
    dirty: bool,
}

impl ManifestCache {
    /// Load the cache at `path`. A missing or unreadable cache is an empty one.
    pub fn load(path: &Path) -> Self {
        let entries = match Self::read_entries(path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("{}", e);
                BTreeMap::new()
            }
        };
        log::debug!("Loaded {} cache entries from {}", entries.len(), path.display());

        ManifestCache {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    fn read_entries(path: &Path) -> Result<BTreeMap<PathBuf, CacheEntry>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(PicsortError::CacheCorrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let file: CacheFile =
            serde_json::from_str(&contents).map_err(|e| PicsortError::CacheCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if file.version != CACHE_VERSION {
            return Err(PicsortError::CacheCorrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", file.version),
            });
        }

        Ok(file.entries)
    }

    /// Cached metadata, only if both modification time and size still match.
    pub fn lookup(&self, path: &Path, modified: OffsetDateTime, size: u64) -> Option<&ExtractedMetadata> {
        self.entries
            .get(path)
            .filter(|entry| entry.modified == modified && entry.size == size)
            .map(|entry| &entry.metadata)
    }

    pub fn upsert(&mut self, path: &Path, modified: OffsetDateTime, size: u64, metadata: ExtractedMetadata) {
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                modified,
                size,
                metadata,
            },
        );
        self.dirty = true;
    }

    /// Drop entries for files that are no longer present.
    pub fn retain_paths(&mut self, present: &HashSet<PathBuf>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| present.contains(path));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist if anything changed since load.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        let file = CacheFile {
            version: CACHE_VERSION,
            entries: std::mem::take(&mut self.entries),
        };
        let written = write_json_atomic(&self.path, &file);
        self.entries = file.entries;
        written?;
        self.dirty = false;
        log::debug!("Saved {} cache entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
