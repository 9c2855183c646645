//! The photo server, as seen by the upload pipeline.
//!
//! [`RemoteClient`] is the only way the pipeline talks to a server. Two
//! implementations ship with the crate: [`HttpClient`] for Immich-compatible
//! REST servers and [`MemoryClient`], an in-process stand-in used by tests
//! and dry runs.

mod http;
mod memory;

pub use http::HttpClient;
pub use memory::MemoryClient;

use crate::asset::CandidateAsset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An asset already stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    #[serde(rename = "originalFileName")]
    pub original_file_name: String,
    #[serde(rename = "fileCreatedAt", default)]
    pub file_created_at: Option<DateTime<Utc>>,
}

/// An album already stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub id: String,
    #[serde(rename = "albumName")]
    pub name: String,
}

/// Narrows [`RemoteClient::list_assets`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFilter {
    /// Only assets with exactly this original file name.
    pub original_file_name: Option<String>,
    pub with_archived: bool,
}

/// Server answer to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub id: String,
    /// The server already had this file; `id` is the existing asset.
    pub duplicate: bool,
}

/// Per-asset outcome of adding assets to an album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumAddResult {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl AlbumAddResult {
    /// Failed, for a reason other than already being a member.
    pub fn is_failure(&self) -> bool {
        !self.success && self.error.as_deref() != Some("duplicate")
    }
}

/// Errors returned by a [`RemoteClient`].
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("server rejected the credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("cannot reach server: {0}")]
    Connection(String),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected server response: {0}")]
    Decode(String),
    #[error("{0}")]
    Rejected(String),
}

impl RemoteError {
    /// Errors after which no further request can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Connection(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Capabilities the pipeline needs from a photo server.
///
/// Implement this trait to target another backend.
///
/// # Example
///
/// ```rust
/// use uplift::remote::{MemoryClient, RemoteClient};
///
/// # async fn example() -> Result<(), uplift::remote::RemoteError> {
/// let client = MemoryClient::new();
/// let album = client.create_album("Holidays", &[]).await?;
/// assert_eq!(client.list_albums().await?, vec![album]);
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<RemoteAsset>, RemoteError>;
    /// Upload one file. A file the server already holds comes back with
    /// `duplicate` set rather than as an error.
    async fn upload_asset(&self, asset: &CandidateAsset) -> Result<UploadResponse, RemoteError>;
    async fn delete_assets(&self, ids: &[String]) -> Result<(), RemoteError>;
    async fn list_albums(&self) -> Result<Vec<RemoteAlbum>, RemoteError>;
    /// Create an album, seeding it with `asset_ids`.
    async fn create_album(&self, name: &str, asset_ids: &[String]) -> Result<RemoteAlbum, RemoteError>;
    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<Vec<AlbumAddResult>, RemoteError>;
}
