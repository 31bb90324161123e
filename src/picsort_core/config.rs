use crate::picsort_core::error::{PicsortError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "picsort.toml";

/// Settings loaded from `picsort.toml`. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Folder of media to triage.
    pub images_dir: PathBuf,
    /// Where the JSON manifest is written.
    pub manifest_path: PathBuf,
    /// Where extracted metadata is cached between builds.
    pub cache_path: PathBuf,
    /// Where exported decisions are written.
    pub decisions_path: PathBuf,
    /// Root for `apply`, one subfolder per status.
    pub sorted_dir: PathBuf,
    /// URL prefix used for each manifest entry's `src`.
    pub src_prefix: String,
    /// Explicit exiftool executable. Searched in PATH when unset.
    pub exiftool_path: Option<PathBuf>,
    pub extraction_timeout_secs: u64,
    /// Files per exiftool request.
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            images_dir: PathBuf::from("images"),
            manifest_path: PathBuf::from("static").join("images.json"),
            cache_path: PathBuf::from("static").join("manifest_cache.json"),
            decisions_path: PathBuf::from("output").join("decisions.json"),
            sorted_dir: PathBuf::from("output").join("sorted"),
            src_prefix: "/images".to_string(),
            exiftool_path: None,
            extraction_timeout_secs: 120,
            batch_size: 200,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `picsort.toml` in the working
    /// directory is used if present, defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(PicsortError::Config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Config::default());
                }
                default
            }
        };

        Config::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| PicsortError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents).map_err(|e| {
            PicsortError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PicsortError::Config("batch_size must be at least 1".to_string()));
        }
        if self.extraction_timeout_secs == 0 {
            return Err(PicsortError::Config(
                "extraction_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}
