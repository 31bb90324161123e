use crate::picsort_core::error::{PicsortError, Result};
use crate::picsort_core::manifest::MediaItem;
use crate::picsort_core::media::Disposition;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How decided files reach the sorted folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Move,
    Copy,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyStats {
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
    pub mode: TransferMode,
}

impl std::fmt::Display for ApplyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.mode {
            TransferMode::Move => "moved",
            TransferMode::Copy => "copied",
        };
        write!(f, "{} files {}, {} skipped", self.transferred, verb, self.skipped)?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// One decisions file entry as read back. Only `name` and `status` matter
/// here, and both may be missing or of the wrong type in an edited file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DecisionEntry {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
}

impl DecisionEntry {
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_ref()
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// `None` for undecided and for statuses this version does not know.
    pub fn disposition(&self) -> Option<Disposition> {
        self.status
            .as_ref()
            .and_then(Value::as_str)
            .and_then(Disposition::from_status)
    }
}

/// Exported files wrap the list in `{"decisions": [...]}`; a bare list is
/// accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum DecisionsInput {
    Wrapped { decisions: Vec<DecisionEntry> },
    Bare(Vec<DecisionEntry>),
}

/// Read the entries of a decisions file.
pub fn read_decisions(path: &Path) -> Result<Vec<DecisionEntry>> {
    let read_error = |reason: String| PicsortError::DecisionsRead {
        path: path.to_path_buf(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|e| read_error(e.to_string()))?;
    let input: DecisionsInput = serde_json::from_str(&contents)
        .map_err(|_| read_error("expected a list of decisions".to_string()))?;

    Ok(match input {
        DecisionsInput::Wrapped { decisions } => decisions,
        DecisionsInput::Bare(decisions) => decisions,
    })
}

/// Sorts decided files into `<sorted_dir>/<status>/<name>`.
#[derive(Debug)]
pub struct DecisionApplier {
    images_dir: PathBuf,
    sorted_dir: PathBuf,
    mode: TransferMode,
    // File name to path relative to the images directory.
    sources: HashMap<String, PathBuf>,
}

impl DecisionApplier {
    pub fn new(images_dir: &Path, sorted_dir: &Path, mode: TransferMode) -> Self {
        DecisionApplier {
            images_dir: images_dir.to_path_buf(),
            sorted_dir: sorted_dir.to_path_buf(),
            mode,
            sources: HashMap::new(),
        }
    }

    /// Resolve names through manifest items, for files in nested folders.
    pub fn with_manifest(mut self, items: &[MediaItem]) -> Self {
        self.sources = items
            .iter()
            .map(|item| (item.filename.clone(), item.source_path.clone()))
            .collect();
        self
    }

    fn source_for(&self, name: &str) -> PathBuf {
        match self.sources.get(name) {
            Some(relative) => self.images_dir.join(relative),
            None => self.images_dir.join(name),
        }
    }

    pub fn apply(&self, decisions: &[DecisionEntry]) -> ApplyStats {
        let mut stats = ApplyStats {
            mode: self.mode,
            ..Default::default()
        };

        for entry in decisions {
            let Some(name) = entry.name() else {
                log::warn!("Skipping decision without a name");
                stats.skipped += 1;
                continue;
            };
            // Undecided and unknown statuses stay where they are.
            let Some(status) = entry.disposition().and_then(|d| d.status()) else {
                if entry.status.as_ref().is_some_and(|s| !s.is_null()) {
                    log::debug!("Leaving {} in place, status {:?}", name, entry.status);
                }
                continue;
            };

            // Names come from a file on disk; never let one escape the target folder.
            if Path::new(name).components().count() != 1 {
                log::warn!("Skipping suspicious name {:?}", name);
                stats.skipped += 1;
                continue;
            }

            let source = self.source_for(name);
            if !source.is_file() {
                log::warn!("Missing source file {}", source.display());
                stats.skipped += 1;
                continue;
            }

            let destination = self.sorted_dir.join(status).join(name);
            if destination.exists() {
                log::warn!("Destination {} already exists", destination.display());
                stats.skipped += 1;
                continue;
            }

            match self.transfer(&source, &destination) {
                Ok(()) => {
                    log::debug!("{} -> {}", source.display(), destination.display());
                    stats.transferred += 1;
                }
                Err(e) => {
                    log::error!("Failed to place {}: {}", source.display(), e);
                    stats.failed += 1;
                }
            }
        }

        log::info!("Applied decisions: {}", stats);
        stats
    }

    fn transfer(&self, source: &Path, destination: &Path) -> io::Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        match self.mode {
            TransferMode::Copy => fs::copy(source, destination).map(|_| ()),
            TransferMode::Move => {
                if fs::rename(source, destination).is_ok() {
                    return Ok(());
                }
                // Rename fails across filesystems.
                fs::copy(source, destination)?;
                fs::remove_file(source)
            }
        }
    }
}
