//! Assets as they travel from discovery to the server.

use crate::exif;
use crate::scan::{MediaKind, RawFile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A local file approved for upload, with its final album set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateAsset {
    /// Base name sent to the server as the original file name.
    pub name: String,
    pub path: PathBuf,
    /// Root-relative, folder-qualified name. Unique per run.
    pub upload_key: String,
    pub kind: MediaKind,
    pub created: Option<DateTime<Utc>>,
    /// Album names; may be empty.
    pub albums: BTreeSet<String>,
    pub partner_shared: bool,
    /// Caption carried over from a Takeout sidecar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CandidateAsset {
    /// Build a candidate with no albums, taking the creation time from the
    /// file itself.
    pub fn from_raw(raw: &RawFile, kind: MediaKind) -> Self {
        Self::with_created(raw, kind, exif::created_time(&raw.path, kind))
    }

    pub fn with_created(raw: &RawFile, kind: MediaKind, created: Option<DateTime<Utc>>) -> Self {
        Self {
            name: raw.name.clone(),
            path: raw.path.clone(),
            upload_key: raw.upload_key(),
            kind,
            created,
            albums: BTreeSet::new(),
            partner_shared: false,
            description: None,
        }
    }

    /// Identifier the server uses to detect re-uploads from this client.
    ///
    /// The upload key with `%` and `/` percent-escaped, so distinct keys never
    /// map to the same id.
    pub fn device_asset_id(&self) -> String {
        let mut id = String::with_capacity(self.upload_key.len());
        for c in self.upload_key.chars() {
            match c {
                '%' => id.push_str("%25"),
                '/' => id.push_str("%2F"),
                _ => id.push(c),
            }
        }
        id
    }
}

/// Outcome of a successful upload; shared by every album the asset joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UploadResult {
    pub asset_id: String,
    pub upload_key: String,
}
