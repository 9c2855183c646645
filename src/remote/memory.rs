//! In-memory photo server for tests and dry runs.

use super::{
    AlbumAddResult, AssetFilter, RemoteAlbum, RemoteAsset, RemoteClient, RemoteError,
    UploadResponse,
};
use crate::asset::CandidateAsset;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// In-memory [`RemoteClient`].
///
/// Uploaded assets get their upload key as id, which keeps album membership
/// readable in assertions. Every call is recorded so tests can check how the
/// pipeline used the server, and failures can be injected per file or per
/// album.
///
/// # Examples
///
/// ```
/// use uplift::remote::{MemoryClient, RemoteClient};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = MemoryClient::new().with_albums(["Holidays"]);
/// let albums = client.list_albums().await?;
/// assert_eq!(albums[0].name, "Holidays");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    assets: Vec<RemoteAsset>,
    /// Upload key to asset id, for duplicate detection.
    by_key: HashMap<String, String>,
    uploads: Vec<String>,
    albums: Vec<RemoteAlbum>,
    members: HashMap<String, Vec<String>>,
    created: Vec<String>,
    additions: Vec<(String, Vec<String>)>,
    deleted: Vec<String>,
    failing_uploads: HashSet<String>,
    failing_albums: HashSet<String>,
    descriptions: HashMap<String, String>,
    album_listings: usize,
    /// `list_albums` calls still to answer with a 503.
    failing_listings: usize,
    unauthorized: bool,
    albums_unauthorized: bool,
}

impl MemoryState {
    fn next_album_id(&self) -> String {
        format!("album-{}", self.albums.len() + 1)
    }

    fn check_credentials(&self) -> Result<(), RemoteError> {
        if self.unauthorized {
            return Err(RemoteError::Unauthorized { status: 401 });
        }
        Ok(())
    }

    fn check_album_credentials(&self) -> Result<(), RemoteError> {
        self.check_credentials()?;
        if self.albums_unauthorized {
            return Err(RemoteError::Unauthorized { status: 403 });
        }
        Ok(())
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Pre-populate assets the server already holds.
    pub fn with_assets(mut self, assets: impl IntoIterator<Item = RemoteAsset>) -> Self {
        self.state.get_mut().assets.extend(assets);
        self
    }

    /// Pre-populate empty albums.
    pub fn with_albums<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        let state = self.state.get_mut();
        for name in names {
            let album = RemoteAlbum {
                id: state.next_album_id(),
                name: name.into(),
            };
            state.members.insert(album.id.clone(), Vec::new());
            state.albums.push(album);
        }
        self
    }

    /// Reject the upload of this upload key.
    pub fn fail_upload(mut self, upload_key: impl Into<String>) -> Self {
        self.state.get_mut().failing_uploads.insert(upload_key.into());
        self
    }

    /// Reject creation of an album with this name.
    pub fn fail_album(mut self, name: impl Into<String>) -> Self {
        self.state.get_mut().failing_albums.insert(name.into());
        self
    }

    /// Answer the next `count` album listings with a 503.
    pub fn fail_album_listings(mut self, count: usize) -> Self {
        self.state.get_mut().failing_listings = count;
        self
    }

    /// Answer every call as if the API key were wrong.
    pub fn reject_credentials(mut self) -> Self {
        self.state.get_mut().unauthorized = true;
        self
    }

    /// Accept uploads but refuse every album call, as for a key without
    /// album permissions.
    pub fn reject_album_credentials(mut self) -> Self {
        self.state.get_mut().albums_unauthorized = true;
        self
    }

    /// Upload keys accepted as new assets, in call order.
    pub async fn uploaded_keys(&self) -> Vec<String> {
        self.state.lock().await.uploads.clone()
    }

    /// Album names passed to `create_album`, in call order.
    pub async fn created_albums(&self) -> Vec<String> {
        self.state.lock().await.created.clone()
    }

    /// `add_assets_to_album` calls as `(album id, asset ids)`.
    pub async fn additions(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().await.additions.clone()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    /// Description stored for an asset id.
    pub async fn description(&self, asset_id: &str) -> Option<String> {
        self.state.lock().await.descriptions.get(asset_id).cloned()
    }

    /// Number of `list_albums` calls, failed ones included.
    pub async fn album_listings(&self) -> usize {
        self.state.lock().await.album_listings
    }

    /// Every album by name with its member asset ids.
    pub async fn album_members(&self) -> BTreeMap<String, BTreeSet<String>> {
        let state = self.state.lock().await;
        state
            .albums
            .iter()
            .map(|album| {
                let members = state
                    .members
                    .get(&album.id)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default();
                (album.name.clone(), members)
            })
            .collect()
    }

    /// Most uploads observed in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteClient for MemoryClient {
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<RemoteAsset>, RemoteError> {
        self.pause().await;
        let state = self.state.lock().await;
        state.check_credentials()?;
        Ok(state
            .assets
            .iter()
            .filter(|a| {
                filter
                    .original_file_name
                    .as_deref()
                    .is_none_or(|name| a.original_file_name == name)
            })
            .cloned()
            .collect())
    }

    async fn upload_asset(&self, asset: &CandidateAsset) -> Result<UploadResponse, RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.pause().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        state.check_credentials()?;
        if state.failing_uploads.contains(&asset.upload_key) {
            return Err(RemoteError::Rejected(format!(
                "upload of {} rejected",
                asset.upload_key
            )));
        }
        if let Some(id) = state.by_key.get(&asset.upload_key) {
            return Ok(UploadResponse {
                id: id.clone(),
                duplicate: true,
            });
        }

        let id = asset.upload_key.clone();
        state.by_key.insert(asset.upload_key.clone(), id.clone());
        state.uploads.push(asset.upload_key.clone());
        if let Some(description) = asset.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            state.descriptions.insert(id.clone(), description.to_string());
        }
        state.assets.push(RemoteAsset {
            id: id.clone(),
            original_file_name: asset.name.clone(),
            file_created_at: asset.created,
        });
        Ok(UploadResponse {
            id,
            duplicate: false,
        })
    }

    async fn delete_assets(&self, ids: &[String]) -> Result<(), RemoteError> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.check_credentials()?;
        let doomed: HashSet<&String> = ids.iter().collect();
        state.assets.retain(|a| !doomed.contains(&a.id));
        state.by_key.retain(|_, id| !doomed.contains(&*id));
        for members in state.members.values_mut() {
            members.retain(|id| !doomed.contains(id));
        }
        state.deleted.extend(ids.iter().cloned());
        Ok(())
    }

    async fn list_albums(&self) -> Result<Vec<RemoteAlbum>, RemoteError> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.check_album_credentials()?;
        state.album_listings += 1;
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(RemoteError::Status {
                status: 503,
                body: "busy".into(),
            });
        }
        Ok(state.albums.clone())
    }

    async fn create_album(&self, name: &str, asset_ids: &[String]) -> Result<RemoteAlbum, RemoteError> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.check_album_credentials()?;
        state.created.push(name.to_string());
        if state.failing_albums.contains(name) {
            return Err(RemoteError::Rejected(format!("album '{name}' rejected")));
        }

        let album = RemoteAlbum {
            id: state.next_album_id(),
            name: name.to_string(),
        };
        state.members.insert(album.id.clone(), asset_ids.to_vec());
        state.albums.push(album.clone());
        Ok(album)
    }

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<Vec<AlbumAddResult>, RemoteError> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.check_album_credentials()?;
        state.additions.push((album_id.to_string(), asset_ids.to_vec()));

        let known: HashSet<String> = state.assets.iter().map(|a| a.id.clone()).collect();
        let Some(members) = state.members.get_mut(album_id) else {
            return Err(RemoteError::Status {
                status: 404,
                body: format!("album {album_id} not found"),
            });
        };

        let results = asset_ids
            .iter()
            .map(|id| {
                let (success, error) = if members.contains(id) {
                    (false, Some("duplicate".to_string()))
                } else if !known.contains(id) {
                    (false, Some("not_found".to_string()))
                } else {
                    members.push(id.clone());
                    (true, None)
                };
                AlbumAddResult {
                    id: id.clone(),
                    success,
                    error,
                }
            })
            .collect();
        Ok(results)
    }
}
