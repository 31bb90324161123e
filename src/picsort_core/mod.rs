pub mod apply;
pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exif;
pub mod export;
pub mod input;
pub mod manifest;
pub mod media;
pub mod session;

pub use apply::{ApplyStats, DecisionApplier, DecisionEntry, TransferMode, read_decisions};
pub use builder::{BuildReport, LibraryStatus, LoadedManifest, ManifestBuilder, RebuildResult};
pub use cache::ManifestCache;
pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{PicsortError, Result};
pub use exif::{ExifToolBackend, ExtractedMetadata, MetadataExtractor, MetadataReader, MetadataTool};
pub use export::{DecisionRecord, DecisionsFile, ExportSummary, ExportWriter};
pub use input::{Button, CommandQueue, ControllerPoller, command_for_input};
pub use manifest::{MediaItem, load_manifest, write_manifest};
pub use media::{Disposition, GpsCoordinate, MediaKind};
pub use session::{Command, FilterMode, TriageSession};
