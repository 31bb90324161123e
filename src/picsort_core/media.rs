use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of a media file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Triage outcome assigned to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Undecided,
    Favorite,
    Like,
    Later,
    Delete,
}

impl Disposition {
    /// Decided values, in the order they are offered to the user.
    pub const DECIDED: [Disposition; 4] = [
        Disposition::Favorite,
        Disposition::Like,
        Disposition::Later,
        Disposition::Delete,
    ];

    /// Export status: `None` for undecided.
    pub fn status(&self) -> Option<&'static str> {
        match self {
            Disposition::Undecided => None,
            Disposition::Favorite => Some("favorite"),
            Disposition::Like => Some("like"),
            Disposition::Later => Some("later"),
            Disposition::Delete => Some("delete"),
        }
    }

    pub fn from_status(status: &str) -> Option<Disposition> {
        Disposition::DECIDED
            .into_iter()
            .find(|d| d.status() == Some(status))
    }

    pub fn is_decided(&self) -> bool {
        *self != Disposition::Undecided
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status().unwrap_or("undecided"))
    }
}

/// A GPS position. Only ever built from both components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl GpsCoordinate {
    /// Pair up optional components. A lone latitude or longitude is no location.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<GpsCoordinate> {
        match (lat, lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(GpsCoordinate { lat, lon })
            }
            _ => None,
        }
    }
}

/// Image file extensions (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "heic", "heif", "png", "tif", "tiff", "gif", "bmp", "webp",
];

/// Video file extensions (lowercase).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v"];

/// Detect media kind from a file path's extension.
pub fn detect_media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Some(MediaKind::Image);
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return Some(MediaKind::Video);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_image_extensions() {
        assert_eq!(detect_media_kind(Path::new("photo.jpg")), Some(MediaKind::Image));
        assert_eq!(detect_media_kind(Path::new("photo.HEIC")), Some(MediaKind::Image));
        assert_eq!(detect_media_kind(Path::new("a/b/scan.TIFF")), Some(MediaKind::Image));
        assert_eq!(detect_media_kind(Path::new("anim.webp")), Some(MediaKind::Image));
    }

    #[test]
    fn test_detect_video_extensions() {
        assert_eq!(detect_media_kind(Path::new("clip.mp4")), Some(MediaKind::Video));
        assert_eq!(detect_media_kind(Path::new("clip.MOV")), Some(MediaKind::Video));
        assert_eq!(detect_media_kind(Path::new("clip.m4v")), Some(MediaKind::Video));
    }

    #[test]
    fn test_detect_unsupported() {
        assert_eq!(detect_media_kind(Path::new("notes.txt")), None);
        assert_eq!(detect_media_kind(Path::new("raw.cr2")), None);
        assert_eq!(detect_media_kind(Path::new("no_extension")), None);
    }

    #[test]
    fn test_partial_gps_is_no_location() {
        assert_eq!(GpsCoordinate::from_parts(Some(48.1), None), None);
        assert_eq!(GpsCoordinate::from_parts(None, Some(11.5)), None);
        assert_eq!(GpsCoordinate::from_parts(None, None), None);
        assert_eq!(
            GpsCoordinate::from_parts(Some(48.1), Some(11.5)),
            Some(GpsCoordinate { lat: 48.1, lon: 11.5 })
        );
    }

    #[test]
    fn test_disposition_status_round_trip() {
        assert_eq!(Disposition::Undecided.status(), None);
        for d in Disposition::DECIDED {
            assert_eq!(Disposition::from_status(d.status().unwrap()), Some(d));
        }
        assert_eq!(Disposition::from_status("keep"), None);
    }
}
