use crate::picsort_core::error::{PicsortError, Result};
use crate::picsort_core::manifest::{write_json_atomic, MediaItem};
use crate::picsort_core::media::{Disposition, MediaKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// One item's outcome as written to the decisions file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    /// Position in the manifest.
    pub index: usize,
    pub name: String,
    /// `None` while undecided.
    pub status: Option<Disposition>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub date_taken: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub original_date: Option<OffsetDateTime>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

impl DecisionRecord {
    fn from_item(index: usize, item: &MediaItem) -> Self {
        DecisionRecord {
            index,
            name: item.filename.clone(),
            status: item.disposition.is_decided().then_some(item.disposition),
            lat: item.gps.map(|g| g.lat),
            lon: item.gps.map(|g| g.lon),
            date_taken: item.capture_date,
            original_date: item.original_date,
            kind: item.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionsFile {
    pub decisions: Vec<DecisionRecord>,
}

impl DecisionsFile {
    /// Records for the whole master list, in manifest order.
    pub fn from_items(items: &[MediaItem]) -> Self {
        DecisionsFile {
            decisions: items
                .iter()
                .enumerate()
                .map(|(index, item)| DecisionRecord::from_item(index, item))
                .collect(),
        }
    }

    pub fn decided_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.status.is_some()).count()
    }
}

/// What one export wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Records written, one per manifest item.
    pub records: usize,
    /// Records with a disposition other than undecided.
    pub decided: usize,
}

impl std::fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} decisions ({} decided)", self.records, self.decided)
    }
}

/// Writes session dispositions to the decisions file.
#[derive(Debug, Clone)]
pub struct ExportWriter {
    path: PathBuf,
}

impl ExportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ExportWriter { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the decisions file with records for `items`. The items are
    /// only read.
    pub fn export(&self, items: &[MediaItem]) -> Result<ExportSummary> {
        let file = DecisionsFile::from_items(items);
        write_json_atomic(&self.path, &file).map_err(|source| {
            log::error!("Failed to export decisions to {}: {}", self.path.display(), source);
            PicsortError::ExportWriteFailed {
                path: self.path.clone(),
                source,
            }
        })?;

        let summary = ExportSummary {
            records: file.decisions.len(),
            decided: file.decided_count(),
        };
        log::info!("Exported {} to {}", summary, self.path.display());
        Ok(summary)
    }
}
