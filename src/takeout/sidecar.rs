//! Takeout JSON sidecars.
//!
//! Two shapes appear in an export: one JSON per media file carrying its title,
//! caption, capture time and origin, and one `metadata.json` per album folder
//! carrying the album title. Older exports nest the album title under
//! `albumData`.

use super::names::is_album_metadata_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Metadata Google recorded for one media file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSidecar {
    pub title: String,
    pub description: String,
    pub taken_time: Option<DateTime<Utc>>,
    /// The file reached this library through partner sharing.
    pub partner_shared: bool,
}

/// Title of an album folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumMetadata {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sidecar {
    Media(MetadataSidecar),
    Album(AlbumMetadata),
}

/// A sidecar that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchIssue {
    #[error("no sidecar found for {}", path.display())]
    MissingSidecar { path: PathBuf },
    #[error("cannot read sidecar {}: {reason}", path.display())]
    UnreadableSidecar { path: PathBuf, reason: String },
    #[error("malformed sidecar {}: {reason}", path.display())]
    MalformedSidecar { path: PathBuf, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawSidecar {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "photoTakenTime")]
    photo_taken_time: Option<RawTimestamp>,
    #[serde(rename = "creationTime")]
    creation_time: Option<RawTimestamp>,
    #[serde(rename = "googlePhotosOrigin")]
    origin: Option<RawOrigin>,
    #[serde(rename = "albumData")]
    album_data: Option<RawAlbumData>,
}

#[derive(Debug, Deserialize)]
struct RawTimestamp {
    /// Seconds since the epoch; Google writes it as a string.
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawOrigin {
    #[serde(rename = "fromPartnerSharing")]
    from_partner_sharing: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawAlbumData {
    #[serde(default)]
    title: Option<String>,
}

impl RawTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        let seconds = match self.timestamp.as_ref()? {
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            Value::Number(n) => n.as_i64()?,
            _ => return None,
        };
        if seconds <= 0 {
            return None;
        }
        DateTime::from_timestamp(seconds, 0)
    }
}

/// Parse sidecar bytes. `file_name` decides between album and media shape
/// when the content alone is ambiguous.
pub fn parse_sidecar(bytes: &[u8], file_name: &str) -> Result<Sidecar, serde_json::Error> {
    let raw: RawSidecar = serde_json::from_slice(bytes)?;

    if let Some(album) = raw.album_data {
        return Ok(Sidecar::Album(AlbumMetadata {
            title: album.title.unwrap_or_default(),
        }));
    }
    if is_album_metadata_name(file_name) {
        return Ok(Sidecar::Album(AlbumMetadata {
            title: raw.title.unwrap_or_default(),
        }));
    }

    let taken_time = raw
        .photo_taken_time
        .as_ref()
        .and_then(RawTimestamp::to_utc)
        .or_else(|| raw.creation_time.as_ref().and_then(RawTimestamp::to_utc));
    let partner_shared = raw
        .origin
        .map(|origin| origin.from_partner_sharing.is_some())
        .unwrap_or(false);

    Ok(Sidecar::Media(MetadataSidecar {
        title: raw.title.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        taken_time,
        partner_shared,
    }))
}

/// Read and parse a sidecar from disk.
pub fn read_sidecar(path: &Path) -> Result<Sidecar, MatchIssue> {
    let bytes = std::fs::read(path).map_err(|e| MatchIssue::UnreadableSidecar {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    parse_sidecar(&bytes, name).map_err(|e| MatchIssue::MalformedSidecar {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
