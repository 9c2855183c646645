use super::report::Tracker;
use crate::asset::UploadResult;
use crate::remote::{RemoteClient, RemoteError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

/// Remote album an album name was bound to.
#[derive(Debug, Clone)]
struct BoundAlbum {
    id: String,
    /// The asset the album was created with, when this run created it.
    seeded_with: Option<String>,
}

/// Per-name state. `remote` resolves once per run, however many workers
/// reach the album at the same time.
#[derive(Debug, Default)]
struct AlbumSlot {
    remote: OnceCell<Result<BoundAlbum, String>>,
    pending: Mutex<Vec<UploadResult>>,
}

impl AlbumSlot {
    fn pending(&self) -> MutexGuard<'_, Vec<UploadResult>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Binds album names to remote albums and batches membership updates.
///
/// The first asset to reach a name either finds an existing album with that
/// exact name or creates one seeded with itself. Later assets queue up and
/// are added in batches of `batch_size`; whatever is left is sent by
/// [`AlbumRegistry::flush`].
///
/// Album errors stay with the album they happened to, except fatal ones,
/// which are kept for [`AlbumRegistry::take_fatal`].
pub(crate) struct AlbumRegistry<'a> {
    client: &'a dyn RemoteClient,
    batch_size: usize,
    /// Server albums by name. Only a successful listing is kept, so a failed
    /// one is retried by the next album to bind.
    existing: OnceCell<HashMap<String, String>>,
    slots: Mutex<HashMap<String, Arc<AlbumSlot>>>,
    fatal: Mutex<Option<RemoteError>>,
}

impl<'a> AlbumRegistry<'a> {
    pub(crate) fn new(client: &'a dyn RemoteClient, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            existing: OnceCell::new(),
            slots: Mutex::new(HashMap::new()),
            fatal: Mutex::new(None),
        }
    }

    /// First fatal server error seen on an album call, if any.
    pub(crate) fn take_fatal(&self) -> Option<RemoteError> {
        self.fatal.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn note_fatal(&self, error: RemoteError) {
        if !error.is_fatal() {
            return;
        }
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    fn slot(&self, name: &str) -> Arc<AlbumSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(name.to_string()).or_default().clone()
    }

    /// Make `member` part of album `name`.
    pub(crate) async fn attach(&self, name: &str, member: &UploadResult, tracker: &Tracker) {
        let slot = self.slot(name);
        let bound = slot
            .remote
            .get_or_init(|| self.bind(name, member, tracker))
            .await;

        let bound = match bound {
            Ok(bound) => bound,
            Err(error) => {
                tracker.album_failed(name, Some(&member.upload_key), error.clone());
                return;
            }
        };
        if bound.seeded_with.as_deref() == Some(member.asset_id.as_str()) {
            tracker.album_joined(name, member);
            return;
        }

        let batch = {
            let mut pending = slot.pending();
            pending.push(member.clone());
            if pending.len() >= self.batch_size {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            self.add_batch(name, &bound.id, batch, tracker).await;
        }
    }

    /// Send every queued membership. Called once all uploads are done.
    pub(crate) async fn flush(&self, tracker: &Tracker) {
        let slots: Vec<(String, Arc<AlbumSlot>)> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        for (name, slot) in slots {
            let Some(Ok(bound)) = slot.remote.get() else {
                continue;
            };
            let batch = std::mem::take(&mut *slot.pending());
            if !batch.is_empty() {
                self.add_batch(&name, &bound.id, batch, tracker).await;
            }
        }
    }

    async fn bind(&self, name: &str, first: &UploadResult, tracker: &Tracker) -> Result<BoundAlbum, String> {
        let existing = self
            .existing
            .get_or_try_init(|| async {
                let albums = self.client.list_albums().await?;
                let mut by_name = HashMap::new();
                for album in albums {
                    by_name.entry(album.name).or_insert(album.id);
                }
                Ok::<_, RemoteError>(by_name)
            })
            .await;

        let existing = match existing {
            Ok(existing) => existing,
            Err(e) => {
                let error = format!("cannot list albums: {e}");
                tracker.album_failed(name, None, error.clone());
                self.note_fatal(e);
                return Err(error);
            }
        };

        if let Some(id) = existing.get(name) {
            log::info!("Using existing album '{name}'");
            tracker.album_bound(name, id, false);
            return Ok(BoundAlbum {
                id: id.clone(),
                seeded_with: None,
            });
        }

        match self
            .client
            .create_album(name, std::slice::from_ref(&first.asset_id))
            .await
        {
            Ok(album) => {
                log::info!("Created album '{name}'");
                tracker.album_bound(name, &album.id, true);
                Ok(BoundAlbum {
                    id: album.id,
                    seeded_with: Some(first.asset_id.clone()),
                })
            }
            Err(e) => {
                let error = format!("cannot create album: {e}");
                tracker.album_failed(name, None, error.clone());
                self.note_fatal(e);
                Err(error)
            }
        }
    }

    async fn add_batch(&self, name: &str, album_id: &str, batch: Vec<UploadResult>, tracker: &Tracker) {
        let mut seen = HashSet::new();
        let ids: Vec<String> = batch
            .iter()
            .filter(|m| seen.insert(m.asset_id.as_str()))
            .map(|m| m.asset_id.clone())
            .collect();
        log::debug!("Adding {} assets to album '{name}'", ids.len());

        match self.client.add_assets_to_album(album_id, &ids).await {
            Ok(results) => {
                let failed: HashMap<&str, &str> = results
                    .iter()
                    .filter(|r| r.is_failure())
                    .map(|r| (r.id.as_str(), r.error.as_deref().unwrap_or("rejected")))
                    .collect();
                for member in &batch {
                    match failed.get(member.asset_id.as_str()) {
                        Some(error) => tracker.album_failed(name, Some(&member.upload_key), *error),
                        None => tracker.album_joined(name, member),
                    }
                }
            }
            Err(e) => {
                for member in &batch {
                    tracker.album_failed(name, Some(&member.upload_key), e.to_string());
                }
                self.note_fatal(e);
            }
        }
    }
}
