use crate::picsort_core::error::{PicsortError, Result};
use crate::picsort_core::media::GpsCoordinate;
use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use exiftool::{ExifTool, ExifToolError};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Date format used in EXIF data.
const EXIF_DATE_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

const EXIF_OFFSET_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// Tags requested from exiftool. `-n` keeps GPS values numeric and signed.
const EXIFTOOL_ARGS: &[&str] = &[
    "-n",
    "-CreateDate",
    "-DateTimeOriginal",
    "-OffsetTime",
    "-OffsetTimeOriginal",
    "-GPSLatitude",
    "-GPSLongitude",
];

/// Metadata embedded in a file. Filesystem fallbacks are never stored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    /// Alternate date field (`CreateDate`).
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub create_date: Option<OffsetDateTime>,
    /// Primary date field (`DateTimeOriginal`), also kept as the original date.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub date_time_original: Option<OffsetDateTime>,
    #[serde(default)]
    pub gps: Option<GpsCoordinate>,
}

/// One exiftool JSON entry. Fields vary in type between files, hence `Value`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct RawExifInfo {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    create_date: Option<Value>,
    #[serde(default)]
    date_time_original: Option<Value>,
    #[serde(default)]
    offset_time: Option<Value>,
    #[serde(default)]
    offset_time_original: Option<Value>,
    #[serde(rename = "GPSLatitude", default)]
    gps_latitude: Option<Value>, // number with -n, "45 deg 30' 16.91\" N" without
    #[serde(rename = "GPSLongitude", default)]
    gps_longitude: Option<Value>,
}

/// Helper to extract f64 from Value (handles both string and number)
fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_gps_string(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    }
}

fn value_to_str(v: &Value) -> Option<&str> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Parse GPS string like "45 deg 30' 16.91\" N" to decimal degrees
fn parse_gps_string(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let degrees: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[2].trim_end_matches('\'').parse().ok()?;
    let seconds: f64 = parts[3]
        .trim_end_matches('"')
        .trim_end_matches('\'')
        .parse()
        .ok()?;
    let direction = parts.get(4).and_then(|s| s.chars().next());

    let mut result = degrees + (minutes / 60.0) + (seconds / 3600.0);

    // South and West are negative
    if direction == Some('S') || direction == Some('W') {
        result = -result;
    }

    Some(result)
}

/// Parse an EXIF date string. An offset suffix on the value wins over
/// `offset_str`; with neither, the local offset is assumed.
fn parse_exif_date(date_str: &str, offset_str: Option<&str>) -> Result<OffsetDateTime> {
    let trimmed = date_str.trim();
    let Some(stamp) = trimmed.get(..19) else {
        return Err(PicsortError::InvalidDateFormat(format!(
            "too short: {:?}",
            trimmed
        )));
    };

    let date_time = PrimitiveDateTime::parse(stamp, EXIF_DATE_FORMAT)
        .map_err(|e| PicsortError::InvalidDateFormat(e.to_string()))?;

    // Sub-second digits are dropped.
    let suffix = trimmed[19..].trim_start_matches(|c: char| c == '.' || c.is_ascii_digit());

    let offset = if suffix == "Z" {
        UtcOffset::UTC
    } else if !suffix.is_empty() {
        UtcOffset::parse(suffix, EXIF_OFFSET_FORMAT)
            .map_err(|e| PicsortError::InvalidDateFormat(e.to_string()))?
    } else {
        match offset_str {
            Some(o) if !o.trim().is_empty() => {
                UtcOffset::parse(o.trim(), EXIF_OFFSET_FORMAT).unwrap_or_else(|_| get_local_offset())
            }
            _ => get_local_offset(),
        }
    };

    Ok(date_time.assume_offset(offset))
}

/// Get the local timezone offset, falling back to UTC if unavailable.
pub fn get_local_offset() -> UtcOffset {
    OffsetDateTime::now_local()
        .map(|dt| dt.offset())
        .unwrap_or(UtcOffset::UTC)
}

/// Filesystem modification time in local time, the last date fallback.
pub fn filesystem_date(meta: &fs::Metadata) -> Option<OffsetDateTime> {
    meta.modified()
        .ok()
        .map(|t| OffsetDateTime::from(t).to_offset(get_local_offset()))
}

/// Turn one exiftool entry into metadata for `path`.
fn parse_entry(path: &Path, entry: &Value) -> Result<ExtractedMetadata> {
    let raw: RawExifInfo =
        serde_json::from_value(entry.clone()).map_err(|e| PicsortError::ExtractionFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if let Some(error) = raw.error {
        return Err(PicsortError::ExtractionFailed {
            path: path.to_path_buf(),
            reason: error,
        });
    }

    let date = |value: &Option<Value>, offset: &Option<Value>| {
        let text = value.as_ref().and_then(value_to_str)?;
        let offset = offset.as_ref().and_then(value_to_str);
        parse_exif_date(text, offset)
            .inspect_err(|e| log::debug!("Ignoring date {:?} in {}: {}", text, path.display(), e))
            .ok()
    };

    Ok(ExtractedMetadata {
        create_date: date(&raw.create_date, &raw.offset_time),
        date_time_original: date(&raw.date_time_original, &raw.offset_time_original),
        gps: GpsCoordinate::from_parts(
            raw.gps_latitude.as_ref().and_then(value_to_f64),
            raw.gps_longitude.as_ref().and_then(value_to_f64),
        ),
    })
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// A source of raw metadata entries, one per file, in exiftool's JSON shape.
pub trait MetadataTool: Send + Sync {
    /// Start the tool. Failure means the tool is unavailable for this build.
    fn open(&self) -> Result<Box<dyn MetadataReader>>;
}

/// An open tool session that can be asked about many files at once.
pub trait MetadataReader: Send {
    /// Read a batch.
    ///
    /// `ExtractionFailed` means some file in the batch could not be read and
    /// the tool is still usable; the caller retries the files one by one.
    /// Any other error means the tool itself is gone.
    fn read_batch(&mut self, paths: &[PathBuf]) -> Result<Vec<Value>>;
}

/// The real exiftool, kept running for the whole build.
#[derive(Debug, Clone, Default)]
pub struct ExifToolBackend {
    executable: Option<PathBuf>,
}

impl ExifToolBackend {
    pub fn new(executable: Option<PathBuf>) -> Self {
        ExifToolBackend { executable }
    }
}

struct ExifToolReader {
    exiftool: ExifTool,
}

impl MetadataTool for ExifToolBackend {
    fn open(&self) -> Result<Box<dyn MetadataReader>> {
        let exiftool = match &self.executable {
            Some(path) => ExifTool::with_executable(path),
            None => ExifTool::new(),
        }
        .map_err(|e| PicsortError::ExtractionUnavailable(e.to_string()))?;

        Ok(Box::new(ExifToolReader { exiftool }))
    }
}

impl MetadataReader for ExifToolReader {
    fn read_batch(&mut self, paths: &[PathBuf]) -> Result<Vec<Value>> {
        self.exiftool
            .json_batch(paths, EXIFTOOL_ARGS)
            .map_err(|e| match e {
                // exiftool fails the whole request when one file is bad.
                ExifToolError::FileNotFound { .. } | ExifToolError::ExifToolProcess { .. } => {
                    PicsortError::ExtractionFailed {
                        path: paths.first().cloned().unwrap_or_default(),
                        reason: e.to_string(),
                    }
                }
                other => PicsortError::ExtractionUnavailable(other.to_string()),
            })
    }
}

enum BatchMessage {
    Batch {
        paths: Vec<PathBuf>,
        entries: Vec<Value>,
    },
    Failed {
        path: PathBuf,
        reason: String,
    },
    Unavailable(String),
}

/// Worker side of an extraction: open the tool once, then read every chunk
/// until done, cancelled, or the receiver hangs up.
fn run_worker(
    tool: Arc<dyn MetadataTool>,
    chunks: Vec<Vec<PathBuf>>,
    tx: Sender<BatchMessage>,
    cancelled: Arc<AtomicBool>,
) {
    let mut reader = match tool.open() {
        Ok(reader) => reader,
        Err(e) => {
            let _ = tx.send(BatchMessage::Unavailable(e.into_unavailable_reason()));
            return;
        }
    };

    for chunk in chunks {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        let message = match reader.read_batch(&chunk) {
            Ok(entries) => BatchMessage::Batch {
                paths: chunk,
                entries,
            },
            Err(PicsortError::ExtractionFailed { reason, .. }) if chunk.len() == 1 => {
                BatchMessage::Failed {
                    path: chunk[0].clone(),
                    reason,
                }
            }
            Err(PicsortError::ExtractionFailed { .. }) => {
                log::debug!("Batch of {} failed, retrying one file at a time", chunk.len());
                if !read_one_by_one(reader.as_mut(), chunk, &tx, &cancelled) {
                    return;
                }
                continue;
            }
            Err(e) => BatchMessage::Unavailable(e.into_unavailable_reason()),
        };

        let stop = matches!(message, BatchMessage::Unavailable(_));
        // A send error means the receiver gave up waiting.
        if tx.send(message).is_err() || stop {
            return;
        }
    }
}

/// Returns false when the worker should stop.
fn read_one_by_one(
    reader: &mut dyn MetadataReader,
    chunk: Vec<PathBuf>,
    tx: &Sender<BatchMessage>,
    cancelled: &AtomicBool,
) -> bool {
    for path in chunk {
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let message = match reader.read_batch(std::slice::from_ref(&path)) {
            Ok(entries) => BatchMessage::Batch {
                paths: vec![path],
                entries,
            },
            Err(PicsortError::ExtractionFailed { reason, .. }) => BatchMessage::Failed { path, reason },
            Err(e) => {
                let _ = tx.send(BatchMessage::Unavailable(e.into_unavailable_reason()));
                return false;
            }
        };
        if tx.send(message).is_err() {
            return false;
        }
    }
    true
}

/// Per-file outcomes of one extraction run.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub outcomes: HashMap<PathBuf, Result<ExtractedMetadata>>,
    /// Set once when the tool could not be used (missing, crashed or too slow).
    pub unavailable: Option<String>,
}

impl ExtractionReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|r| matches!(r, Err(PicsortError::ExtractionFailed { .. })))
            .count()
    }
}

/// Runs the metadata tool over many files with a deadline.
#[derive(Clone)]
pub struct MetadataExtractor {
    tool: Arc<dyn MetadataTool>,
    batch_size: usize,
    timeout: Duration,
}

impl MetadataExtractor {
    pub fn new(tool: Arc<dyn MetadataTool>, batch_size: usize, timeout: Duration) -> Self {
        MetadataExtractor {
            tool,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    /// Extract metadata for `files`.
    ///
    /// Every file gets an outcome. Files the tool never got to (missing tool,
    /// crashed invocation, deadline passed) get `ExtractionUnavailable`.
    /// When the deadline passes the worker is cancelled: it finishes the batch
    /// in flight, then drops the tool, which ends the exiftool process.
    pub fn extract(&self, files: &[PathBuf], bar: &ProgressBar) -> ExtractionReport {
        let mut report = ExtractionReport::default();
        if files.is_empty() {
            return report;
        }

        let (tx, rx) = unbounded::<BatchMessage>();
        let tool = Arc::clone(&self.tool);
        let chunks: Vec<Vec<PathBuf>> = files
            .chunks(self.batch_size)
            .map(<[PathBuf]>::to_vec)
            .collect();
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);

        let spawned = thread::Builder::new()
            .name("metadata-extractor".to_string())
            .spawn(move || run_worker(tool, chunks, tx, worker_cancelled));

        if let Err(e) = spawned {
            report.unavailable = Some(format!("could not start extraction worker: {}", e));
        } else {
            let deadline = Instant::now() + self.timeout;
            loop {
                match rx.recv_deadline(deadline) {
                    Ok(BatchMessage::Batch { paths, entries }) => {
                        bar.inc(paths.len() as u64);
                        resolve_batch(&paths, &entries, &mut report);
                    }
                    Ok(BatchMessage::Failed { path, reason }) => {
                        bar.inc(1);
                        let error = PicsortError::ExtractionFailed {
                            path: path.clone(),
                            reason,
                        };
                        log::warn!("{}", error);
                        report.outcomes.insert(path, Err(error));
                    }
                    Ok(BatchMessage::Unavailable(reason)) => {
                        log::warn!("Metadata tool unavailable: {}", reason);
                        report.unavailable = Some(reason);
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        let reason = format!(
                            "metadata tool did not finish within {}s",
                            self.timeout.as_secs_f64()
                        );
                        log::warn!("{}", reason);
                        report.unavailable = Some(reason);
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            cancelled.store(true, Ordering::SeqCst);
        }

        let mut missing = 0;
        for path in files {
            if !report.outcomes.contains_key(path) {
                missing += 1;
                let reason = report
                    .unavailable
                    .clone()
                    .unwrap_or_else(|| "metadata worker stopped early".to_string());
                report
                    .outcomes
                    .insert(path.clone(), Err(PicsortError::ExtractionUnavailable(reason)));
            }
        }
        if missing > 0 && report.unavailable.is_none() {
            report.unavailable = Some("metadata worker stopped early".to_string());
        }
        bar.inc(missing);

        report
    }
}

/// Match exiftool entries back to the requested paths by `SourceFile`.
fn resolve_batch(paths: &[PathBuf], entries: &[Value], report: &mut ExtractionReport) {
    let mut by_source: HashMap<String, &Value> = HashMap::new();
    for entry in entries {
        match entry.get("SourceFile").and_then(Value::as_str) {
            Some(source) => {
                by_source.insert(source.replace('\\', "/"), entry);
            }
            None => log::warn!("Metadata entry without SourceFile ignored"),
        }
    }

    for path in paths {
        let outcome = match by_source.get(&path_key(path)) {
            Some(entry) => parse_entry(path, entry),
            None => Err(PicsortError::ExtractionFailed {
                path: path.clone(),
                reason: "no metadata entry returned".to_string(),
            }),
        };
        if let Err(e) = &outcome {
            log::warn!("{}", e);
        }
        report.outcomes.insert(path.clone(), outcome);
    }
}
