use crate::picsort_core::cache::ManifestCache;
use crate::picsort_core::config::Config;
use crate::picsort_core::error::{PicsortError, Result};
use crate::picsort_core::exif::{
    ExifToolBackend, ExtractedMetadata, MetadataExtractor, MetadataTool, filesystem_date,
};
use crate::picsort_core::manifest::{
    MediaItem, load_manifest, make_src, sort_items, write_json_atomic, write_manifest,
};
use crate::picsort_core::media::{Disposition, MediaKind, detect_media_kind};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use time::OffsetDateTime;
use walkdir::WalkDir;

/// A file left out of the manifest, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub reason: String,
}

/// A supported file found while walking the directory.
#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    relative: PathBuf,
    filename: String,
    kind: MediaKind,
}

/// A candidate that could be opened and stat'ed.
#[derive(Debug)]
struct FileState {
    candidate: Candidate,
    modified: Option<OffsetDateTime>,
    size: u64,
}

/// Outcome of one manifest build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub items: Vec<MediaItem>,
    pub skipped: Vec<Diagnostic>,
    /// Set when the metadata tool could not be used for this build.
    pub unavailable: Option<String>,
    pub extraction_failures: usize,
    pub cache_hits: usize,
    pub extracted: usize,
}

impl BuildReport {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn gps_count(&self) -> usize {
        self.items.iter().filter(|i| i.gps.is_some()).count()
    }

    pub fn status(&self) -> LibraryStatus {
        self.condition().status()
    }

    fn condition(&self) -> BuildCondition {
        BuildCondition {
            count: self.count(),
            unavailable: self.unavailable.clone(),
            failed: self.extraction_failures,
            skipped: self.skipped.len(),
        }
    }
}

/// How the last build went. Stored next to the manifest so that later loads
/// still report a degraded or tool-missing build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BuildCondition {
    count: usize,
    #[serde(default)]
    unavailable: Option<String>,
    #[serde(default)]
    failed: usize,
    #[serde(default)]
    skipped: usize,
}

impl BuildCondition {
    fn status(&self) -> LibraryStatus {
        if let Some(reason) = &self.unavailable {
            return LibraryStatus::ToolMissing {
                count: self.count,
                reason: reason.clone(),
            };
        }
        if self.count == 0 && self.skipped == 0 {
            return LibraryStatus::Empty;
        }
        if self.failed > 0 || self.skipped > 0 {
            return LibraryStatus::Degraded {
                count: self.count,
                failed: self.failed,
                skipped: self.skipped,
            };
        }
        LibraryStatus::Ready { count: self.count }
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} items ({} with GPS), {} from cache, {} extracted, {} skipped",
            self.count(),
            self.gps_count(),
            self.cache_hits,
            self.extracted,
            self.skipped.len()
        )
    }
}

/// What the user should be told about the current manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryStatus {
    Ready { count: usize },
    Empty,
    Degraded { count: usize, failed: usize, skipped: usize },
    ToolMissing { count: usize, reason: String },
    Unreadable { reason: String },
}

impl LibraryStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, LibraryStatus::Ready { .. } | LibraryStatus::Empty)
    }
}

impl std::fmt::Display for LibraryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryStatus::Ready { count } => write!(f, "{} items ready for triage.", count),
            LibraryStatus::Empty => write!(f, "No supported media files found."),
            LibraryStatus::Degraded {
                count,
                failed,
                skipped,
            } => write!(
                f,
                "{} items ready, {} with unreadable metadata (dated by file modification time), {} files skipped.",
                count, failed, skipped
            ),
            LibraryStatus::ToolMissing { count, reason } => write!(
                f,
                "Metadata tool unavailable ({}). {} items dated by file modification time, no GPS.",
                reason, count
            ),
            LibraryStatus::Unreadable { reason } => write!(f, "Manifest unreadable: {}", reason),
        }
    }
}

/// Result of an explicit rebuild request, shaped for clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildResult {
    pub ok: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<BuildReport>> for RebuildResult {
    fn from(result: Result<BuildReport>) -> Self {
        match result {
            Ok(report) => RebuildResult {
                ok: report.unavailable.is_none(),
                count: report.count(),
                error: report.unavailable,
            },
            Err(e) => RebuildResult {
                ok: false,
                count: 0,
                error: Some(e.to_string()),
            },
        }
    }
}

/// A manifest ready for a session, with the status to show alongside it.
#[derive(Debug)]
pub struct LoadedManifest {
    pub items: Vec<MediaItem>,
    pub status: LibraryStatus,
}

/// Removes a directory from the in-flight set when the build ends.
struct RebuildGuard {
    key: PathBuf,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Builds and persists the manifest for a directory. Clones share the
/// in-flight set, so at most one build per directory runs at a time.
#[derive(Clone)]
pub struct ManifestBuilder {
    manifest_path: PathBuf,
    condition_path: PathBuf,
    cache_path: PathBuf,
    src_prefix: String,
    extractor: MetadataExtractor,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    show_progress: bool,
}

impl ManifestBuilder {
    pub fn new(config: &Config) -> Self {
        let tool = ExifToolBackend::new(config.exiftool_path.clone());
        Self::with_tool(config, Arc::new(tool))
    }

    pub fn with_tool(config: &Config, tool: Arc<dyn MetadataTool>) -> Self {
        ManifestBuilder {
            manifest_path: config.manifest_path.clone(),
            condition_path: config.manifest_path.with_extension("status.json"),
            cache_path: config.cache_path.clone(),
            src_prefix: config.src_prefix.clone(),
            extractor: MetadataExtractor::new(tool, config.batch_size, config.extraction_timeout()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            show_progress: false,
        }
    }

    /// Show a progress bar while extracting.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    fn acquire(&self, key: PathBuf) -> Result<RebuildGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            log::warn!("Rejecting rebuild of {}: already running", key.display());
            return Err(PicsortError::RebuildInProgress(key));
        }
        Ok(RebuildGuard {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Build the manifest for `directory` and replace the manifest file.
    ///
    /// Unreadable files are skipped and reported; only manifest write failures
    /// and a concurrent build of the same directory abort.
    pub fn build(&self, directory: &Path) -> Result<BuildReport> {
        if !directory.is_dir() {
            return Err(PicsortError::NotADirectory(directory.to_path_buf()));
        }
        let root = fs::canonicalize(directory)?;
        let _guard = self.acquire(root.clone())?;

        log::info!("Phase 1: Scanning {}", root.display());
        let mut report = BuildReport::default();
        let candidates = collect_candidates(&root, &mut report.skipped);

        let states: Vec<std::result::Result<FileState, Diagnostic>> =
            candidates.into_par_iter().map(stat_candidate).collect();

        let mut files = Vec::with_capacity(states.len());
        for state in states {
            match state {
                Ok(file) => files.push(file),
                Err(diagnostic) => {
                    log::warn!("Skipping {}: {}", diagnostic.path.display(), diagnostic.reason);
                    report.skipped.push(diagnostic);
                }
            }
        }

        log::info!("Phase 2: Reading metadata for {} files", files.len());
        let mut cache = ManifestCache::load(&self.cache_path);
        let mut metadata: Vec<Option<ExtractedMetadata>> = files
            .iter()
            .map(|file| {
                file.modified
                    .and_then(|modified| cache.lookup(&file.candidate.path, modified, file.size))
                    .cloned()
            })
            .collect();
        report.cache_hits = metadata.iter().filter(|m| m.is_some()).count();

        let misses: Vec<PathBuf> = files
            .iter()
            .zip(&metadata)
            .filter(|(_, cached)| cached.is_none())
            .map(|(file, _)| file.candidate.path.clone())
            .collect();
        log::debug!("{} cache hits, {} misses", report.cache_hits, misses.len());

        let bar = self.progress_bar(misses.len());
        let mut extraction = self.extractor.extract(&misses, &bar);
        bar.finish_and_clear();
        report.unavailable = extraction.unavailable.take();
        report.extraction_failures = extraction.failed_count();

        for (file, slot) in files.iter().zip(metadata.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            let outcome = extraction.outcomes.remove(&file.candidate.path);
            let extracted = match outcome {
                Some(Ok(extracted)) => {
                    report.extracted += 1;
                    Some(extracted)
                }
                // The file itself is the problem; remember that until it changes.
                Some(Err(PicsortError::ExtractionFailed { .. })) => Some(ExtractedMetadata::default()),
                _ => None,
            };
            if let (Some(extracted), Some(modified)) = (&extracted, file.modified) {
                cache.upsert(&file.candidate.path, modified, file.size, extracted.clone());
            }
            *slot = Some(extracted.unwrap_or_default());
        }

        let present: HashSet<PathBuf> = files.iter().map(|f| f.candidate.path.clone()).collect();
        let pruned = cache.retain_paths(&present);
        if pruned > 0 {
            log::debug!("Pruned {} stale cache entries", pruned);
        }
        if let Err(e) = cache.save() {
            log::warn!("Could not save metadata cache: {}", e);
        }

        let mut items: Vec<MediaItem> = files
            .into_iter()
            .zip(metadata)
            .map(|(file, meta)| self.make_item(file, meta.unwrap_or_default()))
            .collect();
        sort_items(&mut items);

        log::info!("Phase 3: Writing manifest");
        write_manifest(&self.manifest_path, &items)?;
        report.items = items;
        if let Err(e) = write_json_atomic(&self.condition_path, &report.condition()) {
            log::warn!("Could not record build status in {}: {}", self.condition_path.display(), e);
        }

        log::info!("Build complete: {}", report);
        Ok(report)
    }

    fn make_item(&self, file: FileState, meta: ExtractedMetadata) -> MediaItem {
        let Candidate {
            relative,
            filename,
            kind,
            ..
        } = file.candidate;

        MediaItem {
            src: make_src(&self.src_prefix, &relative),
            source_path: relative,
            filename,
            kind,
            capture_date: meta
                .date_time_original
                .or(meta.create_date)
                .or(file.modified),
            original_date: meta.date_time_original,
            gps: meta.gps,
            disposition: Disposition::Undecided,
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress || len == 0 {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = ProgressBar::new(len as u64).with_style(style);
        bar.set_message("Reading metadata");
        bar
    }

    /// True when the manifest is missing or older than the newest media file.
    pub fn needs_rebuild(&self, directory: &Path) -> Result<bool> {
        let manifest_modified = match fs::metadata(&self.manifest_path) {
            Ok(meta) => meta.modified()?,
            Err(_) => return Ok(true),
        };

        Ok(newest_media_mtime(directory)
            .map(|newest| newest > manifest_modified)
            .unwrap_or(false))
    }

    /// Manifest for a session: rebuilt when stale, missing or unreadable.
    ///
    /// If another build of the same directory is running, the last persisted
    /// manifest is returned instead.
    pub fn load_or_build(&self, directory: &Path) -> Result<LoadedManifest> {
        if !self.needs_rebuild(directory)? {
            match load_manifest(&self.manifest_path, &self.src_prefix) {
                Ok(items) => return Ok(self.loaded(items)),
                Err(e) => log::warn!("{}; rebuilding", e),
            }
        }

        match self.build(directory) {
            Ok(report) => {
                let status = report.status();
                Ok(LoadedManifest {
                    items: report.items,
                    status,
                })
            }
            Err(PicsortError::RebuildInProgress(_)) => {
                let items = load_manifest(&self.manifest_path, &self.src_prefix)?;
                Ok(self.loaded(items))
            }
            Err(e) => Err(e),
        }
    }

    /// Explicit rebuild, reported as `{ok, count, error}`.
    pub fn rebuild(&self, directory: &Path) -> RebuildResult {
        let result = self.build(directory);
        if let Err(e) = &result {
            log::error!("Manifest rebuild failed: {}", e);
        }
        RebuildResult::from(result)
    }

    /// Status of the persisted manifest without rebuilding it.
    pub fn status(&self) -> LibraryStatus {
        match load_manifest(&self.manifest_path, &self.src_prefix) {
            Ok(items) => self.loaded(items).status,
            Err(e) => LibraryStatus::Unreadable {
                reason: e.to_string(),
            },
        }
    }

    /// Pair persisted items with the condition of the build that wrote them.
    fn loaded(&self, items: Vec<MediaItem>) -> LoadedManifest {
        let status = self
            .read_condition(items.len())
            .unwrap_or(BuildCondition {
                count: items.len(),
                ..Default::default()
            })
            .status();
        LoadedManifest { items, status }
    }

    /// The recorded condition, if it belongs to a manifest of `count` items.
    fn read_condition(&self, count: usize) -> Option<BuildCondition> {
        let contents = fs::read_to_string(&self.condition_path).ok()?;
        match serde_json::from_str::<BuildCondition>(&contents) {
            Ok(condition) if condition.count == count => Some(condition),
            Ok(_) => {
                log::debug!("Ignoring build status for a different manifest");
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable build status {}: {}", self.condition_path.display(), e);
                None
            }
        }
    }
}

/// Walk `root` for supported files. The first file (by relative path) with a
/// given name wins; later ones are reported and left out.
fn collect_candidates(root: &Path, skipped: &mut Vec<Diagnostic>) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                log::warn!("Skipping {}: {}", path.display(), e);
                skipped.push(Diagnostic {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(kind) = detect_media_kind(entry.path()) else {
            continue;
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let filename = entry.file_name().to_string_lossy().to_string();

        candidates.push(Candidate {
            path: entry.into_path(),
            relative,
            filename,
            kind,
        });
    }

    candidates.sort_by(|a, b| a.relative.cmp(&b.relative));
    let mut names = HashSet::new();
    candidates.retain(|c| {
        if names.insert(c.filename.clone()) {
            return true;
        }
        log::warn!("Skipping {}: duplicate file name", c.path.display());
        skipped.push(Diagnostic {
            path: c.path.clone(),
            reason: format!("duplicate file name {}", c.filename),
        });
        false
    });

    candidates
}

fn stat_candidate(candidate: Candidate) -> std::result::Result<FileState, Diagnostic> {
    let fail = |reason: String, candidate: &Candidate| Diagnostic {
        path: candidate.path.clone(),
        reason,
    };

    if let Err(e) = fs::File::open(&candidate.path) {
        return Err(fail(e.to_string(), &candidate));
    }
    let meta = match fs::metadata(&candidate.path) {
        Ok(meta) => meta,
        Err(e) => return Err(fail(e.to_string(), &candidate)),
    };

    Ok(FileState {
        modified: filesystem_date(&meta),
        size: meta.len(),
        candidate,
    })
}

fn newest_media_mtime(directory: &Path) -> Option<SystemTime> {
    WalkDir::new(directory)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && detect_media_kind(e.path()).is_some())
        .filter_map(|e| e.metadata().ok().and_then(|m| m.modified().ok()))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picsort_core::exif::testing::FakeTool;
    use crate::picsort_core::media::GpsCoordinate;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        images: PathBuf,
        config: Config,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images");
        fs::create_dir_all(&images).unwrap();
        for name in files {
            let path = images.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, name.as_bytes()).unwrap();
        }
        let config = Config {
            images_dir: images.clone(),
            manifest_path: dir.path().join("static").join("images.json"),
            cache_path: dir.path().join("static").join("cache.json"),
            ..Config::default()
        };
        Fixture {
            _dir: dir,
            images,
            config,
        }
    }

    fn builder(fx: &Fixture, tool: &Arc<FakeTool>) -> ManifestBuilder {
        ManifestBuilder::with_tool(&fx.config, Arc::new(Arc::clone(tool)))
    }

    fn mtime(path: &Path) -> Option<OffsetDateTime> {
        filesystem_date(&fs::metadata(path).unwrap())
    }

    #[test]
    fn test_tool_missing_falls_back_to_mtime() {
        let fx = fixture(&["a.jpg", "b.png", "c.heic"]);
        let tool = Arc::new(FakeTool {
            missing: true,
            ..Default::default()
        });

        let report = builder(&fx, &tool).build(&fx.images).unwrap();
        assert_eq!(report.count(), 3);
        for item in &report.items {
            assert_eq!(item.capture_date, mtime(&fx.images.join(&item.filename)));
            assert_eq!(item.original_date, None);
            assert_eq!(item.gps, None);
        }
        assert!(matches!(report.status(), LibraryStatus::ToolMissing { count: 3, .. }));

        let persisted = load_manifest(&fx.config.manifest_path, "/images").unwrap();
        assert_eq!(persisted.len(), 3);
    }

    #[test]
    fn test_status_remembers_how_manifest_was_built() {
        let fx = fixture(&["a.jpg", "b.jpg"]);
        let missing = Arc::new(FakeTool {
            missing: true,
            ..Default::default()
        });
        let builder = builder(&fx, &missing);
        builder.build(&fx.images).unwrap();

        assert!(matches!(builder.status(), LibraryStatus::ToolMissing { count: 2, .. }));
        let loaded = builder.load_or_build(&fx.images).unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert!(matches!(loaded.status, LibraryStatus::ToolMissing { count: 2, .. }));

        // A later build with a working tool clears it.
        let working = Arc::new(FakeTool::default());
        let rebuilt = ManifestBuilder::with_tool(&fx.config, Arc::new(Arc::clone(&working)));
        rebuilt.build(&fx.images).unwrap();
        assert_eq!(rebuilt.status(), LibraryStatus::Ready { count: 2 });
    }

    #[test]
    fn test_status_remembers_degraded_build() {
        let fx = fixture(&["a.jpg", "bad.jpg"]);
        let tool = Arc::new(FakeTool::default().with_entry("bad.jpg", json!({ "Error": "truncated" })));
        let builder = builder(&fx, &tool);
        builder.build(&fx.images).unwrap();

        assert_eq!(
            builder.status(),
            LibraryStatus::Degraded {
                count: 2,
                failed: 1,
                skipped: 0
            }
        );
        assert!(builder.status().to_string().contains("unreadable metadata"));
    }

    #[test]
    fn test_date_precedence_and_gps() {
        let fx = fixture(&["both.jpg", "alt.jpg", "create.jpg", "none.mov", "halfgps.jpg"]);
        let tool = Arc::new(
            FakeTool::default()
                .with_entry(
                    "both.jpg",
                    json!({
                        "CreateDate": "2021:01:01 00:00:00",
                        "DateTimeOriginal": "2020:01:01 00:00:00",
                        "OffsetTime": "+00:00",
                        "OffsetTimeOriginal": "+00:00",
                        "GPSLatitude": 10.0,
                        "GPSLongitude": 20.0,
                    }),
                )
                .with_entry(
                    "alt.jpg",
                    json!({ "DateTimeOriginal": "2019:01:01 00:00:00", "OffsetTimeOriginal": "+00:00" }),
                )
                .with_entry(
                    "create.jpg",
                    json!({ "CreateDate": "2018:01:01 00:00:00", "OffsetTime": "+00:00" }),
                )
                .with_entry("halfgps.jpg", json!({ "GPSLongitude": 20.0 })),
        );

        let report = builder(&fx, &tool).build(&fx.images).unwrap();
        let get = |name: &str| report.items.iter().find(|i| i.filename == name).unwrap();

        // DateTimeOriginal wins over CreateDate.
        let both = get("both.jpg");
        assert_eq!(both.capture_date.unwrap().year(), 2020);
        assert_eq!(both.original_date.unwrap().year(), 2020);
        assert_eq!(both.gps, Some(GpsCoordinate { lat: 10.0, lon: 20.0 }));

        let alt = get("alt.jpg");
        assert_eq!(alt.capture_date.unwrap().year(), 2019);
        assert_eq!(alt.original_date, alt.capture_date);

        let create = get("create.jpg");
        assert_eq!(create.capture_date.unwrap().year(), 2018);
        assert_eq!(create.original_date, None);

        let none = get("none.mov");
        assert_eq!(none.kind, MediaKind::Video);
        assert_eq!(none.capture_date, mtime(&fx.images.join("none.mov")));
        assert_eq!(none.original_date, None);

        assert_eq!(get("halfgps.jpg").gps, None);
        assert_eq!(report.status(), LibraryStatus::Ready { count: 5 });
    }

    #[test]
    fn test_second_build_uses_cache_only() {
        let fx = fixture(&["a.jpg", "b.jpg", "c.mp4"]);
        let tool = Arc::new(FakeTool::default());
        let builder = builder(&fx, &tool);

        let first = builder.build(&fx.images).unwrap();
        assert_eq!(tool.files_read(), 3);
        assert_eq!(first.extracted, 3);

        let second = builder.build(&fx.images).unwrap();
        assert_eq!(tool.files_read(), 3);
        assert_eq!(second.cache_hits, 3);
        assert_eq!(second.extracted, 0);

        // Only the changed file is read again.
        fs::write(fx.images.join("b.jpg"), b"a longer body than before").unwrap();
        let third = builder.build(&fx.images).unwrap();
        assert_eq!(tool.files_read(), 4);
        assert_eq!(third.cache_hits, 2);
    }

    #[test]
    fn test_unavailable_results_are_not_cached() {
        let fx = fixture(&["a.jpg"]);
        let missing = Arc::new(FakeTool {
            missing: true,
            ..Default::default()
        });
        builder(&fx, &missing).build(&fx.images).unwrap();

        let available = Arc::new(FakeTool::default());
        let report = builder(&fx, &available).build(&fx.images).unwrap();
        assert_eq!(available.files_read(), 1);
        assert!(report.unavailable.is_none());
    }

    #[test]
    fn test_unique_names_and_total_order() {
        let fx = fixture(&["z.jpg", "a.jpg", "m.png", "sub/a.jpg", "sub/q.mov"]);
        let tool = Arc::new(
            FakeTool::default()
                .with_entry("z.jpg", json!({ "CreateDate": "2022:01:01 00:00:00", "OffsetTime": "+00:00" }))
                .with_entry("m.png", json!({ "CreateDate": "2022:01:01 00:00:00", "OffsetTime": "+00:00" })),
        );

        let report = builder(&fx, &tool).build(&fx.images).unwrap();
        let names: HashSet<&str> = report.items.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names.len(), report.items.len());
        assert_eq!(report.items.len(), 4);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("sub/a.jpg"));

        for pair in report.items.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.capture_date > b.capture_date
                    || (a.capture_date == b.capture_date && a.filename < b.filename)
            );
        }
        assert!(matches!(report.status(), LibraryStatus::Degraded { skipped: 1, .. }));
    }

    #[test]
    fn test_nested_src_paths() {
        let fx = fixture(&["2023/trip/a.jpg"]);
        let tool = Arc::new(FakeTool::default());
        let report = builder(&fx, &tool).build(&fx.images).unwrap();
        assert_eq!(report.items[0].src, "/images/2023/trip/a.jpg");
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_file_is_skipped_not_fatal() {
        let fx = fixture(&["a.jpg", "b.jpg"]);
        std::os::unix::fs::symlink(fx.images.join("gone.jpg"), fx.images.join("broken.jpg")).unwrap();
        let tool = Arc::new(FakeTool::default());

        let report = builder(&fx, &tool).build(&fx.images).unwrap();
        assert_eq!(report.count(), 2);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_empty_directory() {
        let fx = fixture(&[]);
        fs::write(fx.images.join("notes.txt"), b"not media").unwrap();
        let tool = Arc::new(FakeTool::default());

        let report = builder(&fx, &tool).build(&fx.images).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(report.status(), LibraryStatus::Empty);
        assert_eq!(tool.opens.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(fx.config.manifest_path.exists());
    }

    #[test]
    fn test_not_a_directory() {
        let fx = fixture(&["a.jpg"]);
        let tool = Arc::new(FakeTool::default());
        let err = builder(&fx, &tool).build(&fx.images.join("a.jpg")).unwrap_err();
        assert!(matches!(err, PicsortError::NotADirectory(_)));
    }

    #[test]
    fn test_needs_rebuild_triggers() {
        let fx = fixture(&["a.jpg"]);
        let tool = Arc::new(FakeTool::default());
        let builder = builder(&fx, &tool);

        assert!(builder.needs_rebuild(&fx.images).unwrap());
        builder.build(&fx.images).unwrap();
        assert!(!builder.needs_rebuild(&fx.images).unwrap());

        let newer = fs::File::options().write(true).open(fx.images.join("a.jpg")).unwrap();
        newer
            .set_modified(SystemTime::now() + Duration::from_secs(120))
            .unwrap();
        assert!(builder.needs_rebuild(&fx.images).unwrap());
    }

    #[test]
    fn test_load_or_build_recovers_corrupt_manifest() {
        let fx = fixture(&["a.jpg", "b.jpg"]);
        let tool = Arc::new(FakeTool::default());
        let builder = builder(&fx, &tool);
        builder.build(&fx.images).unwrap();

        fs::write(&fx.config.manifest_path, "not json").unwrap();
        assert!(matches!(builder.status(), LibraryStatus::Unreadable { .. }));

        let loaded = builder.load_or_build(&fx.images).unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.status, LibraryStatus::Ready { count: 2 });
        assert_eq!(builder.status(), LibraryStatus::Ready { count: 2 });
    }

    #[test]
    fn test_concurrent_rebuilds_are_serialized() {
        let fx = fixture(&["a.jpg", "b.jpg", "c.jpg"]);
        builder(&fx, &Arc::new(FakeTool::default()))
            .build(&fx.images)
            .unwrap();

        let slow = Arc::new(FakeTool {
            delay: Some(Duration::from_millis(300)),
            ..Default::default()
        });
        let builder = builder(&fx, &slow);
        // Force extraction on the next build.
        fs::remove_file(&fx.config.cache_path).unwrap();

        let results: Vec<RebuildResult> = thread::scope(|s| {
            let first = s.spawn(|| builder.rebuild(&fx.images));
            thread::sleep(Duration::from_millis(100));
            let second = s.spawn(|| builder.rebuild(&fx.images));

            // Readers only ever see a complete manifest.
            let reader = s.spawn(|| {
                for _ in 0..50 {
                    let items = load_manifest(&fx.config.manifest_path, "/images").unwrap();
                    assert_eq!(items.len(), 3);
                    thread::sleep(Duration::from_millis(5));
                }
            });
            reader.join().unwrap();
            vec![first.join().unwrap(), second.join().unwrap()]
        });

        assert_eq!(results.iter().filter(|r| r.ok).count(), 1);
        let rejected = results.iter().find(|r| !r.ok).unwrap();
        assert!(rejected.error.as_deref().unwrap().contains("already running"));

        // Once finished, the directory can be rebuilt again.
        assert!(builder.rebuild(&fx.images).ok);
    }

    #[test]
    fn test_rebuild_result_json() {
        let ok = RebuildResult {
            ok: true,
            count: 3,
            error: None,
        };
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({ "ok": true, "count": 3 }));
    }
}
