use crate::picsort_core::error::{PicsortError, Result};
use crate::picsort_core::media::{Disposition, GpsCoordinate, MediaKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

/// One media file in the manifest, plus its triage state.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// File name, unique within a manifest.
    pub filename: String,
    /// Path relative to the images directory.
    pub source_path: PathBuf,
    pub src: String,
    pub kind: MediaKind,
    pub capture_date: Option<OffsetDateTime>,
    pub original_date: Option<OffsetDateTime>,
    pub gps: Option<GpsCoordinate>,
    pub disposition: Disposition,
}

/// Manifest element as stored on disk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    filename: String,
    src: String,
    #[serde(rename = "type")]
    kind: MediaKind,
    #[serde(with = "time::serde::rfc3339::option", default)]
    date_taken: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    original_date: Option<OffsetDateTime>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

impl From<&MediaItem> for ManifestEntry {
    fn from(item: &MediaItem) -> Self {
        ManifestEntry {
            filename: item.filename.clone(),
            src: item.src.clone(),
            kind: item.kind,
            date_taken: item.capture_date,
            original_date: item.original_date,
            lat: item.gps.map(|g| g.lat),
            lon: item.gps.map(|g| g.lon),
        }
    }
}

impl ManifestEntry {
    fn into_item(self, src_prefix: &str) -> MediaItem {
        let prefix = format!("{}/", src_prefix.trim_end_matches('/'));
        let relative = self
            .src
            .strip_prefix(&prefix)
            .unwrap_or(&self.filename)
            .to_string();

        MediaItem {
            source_path: PathBuf::from(relative),
            gps: GpsCoordinate::from_parts(self.lat, self.lon),
            filename: self.filename,
            src: self.src,
            kind: self.kind,
            capture_date: self.date_taken,
            original_date: self.original_date,
            disposition: Disposition::Undecided,
        }
    }
}

/// Build the `src` value for a file relative to the images directory.
pub fn make_src(src_prefix: &str, relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    format!("{}/{}", src_prefix.trim_end_matches('/'), parts.join("/"))
}

/// Newest capture date first, undated items last, file name breaking ties.
pub fn sort_items(items: &mut [MediaItem]) {
    items.sort_by(|a, b| {
        b.capture_date
            .cmp(&a.capture_date)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Serialize `value` as pretty JSON next to `path`, then rename it over `path`.
/// Readers see either the old file or the new one, never a partial write.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Replace the manifest file with `items`.
pub fn write_manifest(path: &Path, items: &[MediaItem]) -> Result<()> {
    let entries: Vec<ManifestEntry> = items.iter().map(ManifestEntry::from).collect();
    write_json_atomic(path, &entries).map_err(|source| PicsortError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Wrote {} manifest entries to {}", items.len(), path.display());
    Ok(())
}

/// Read a manifest written by [`write_manifest`]. Every item starts undecided.
pub fn load_manifest(path: &Path, src_prefix: &str) -> Result<Vec<MediaItem>> {
    let read_error = |reason: String| PicsortError::ManifestRead {
        path: path.to_path_buf(),
        reason,
    };

    let contents = fs::read_to_string(path).map_err(|e| read_error(e.to_string()))?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&contents).map_err(|e| read_error(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.filename.clone()) {
            return Err(read_error(format!("duplicate entry {}", entry.filename)));
        }
        items.push(entry.into_item(src_prefix));
    }

    log::debug!("Loaded {} manifest entries from {}", items.len(), path.display());
    Ok(items)
}
