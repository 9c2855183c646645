//! Upload orchestration.
//!
//! The [`Uploader`] pushes candidates to a [`RemoteClient`] with bounded
//! concurrency, then makes every uploaded asset a member of its albums. Each
//! album is resolved on the server exactly once per run, even when many
//! uploads reach it at the same moment; further members are added in batches.
//!
//! Per-asset and per-album problems land in the [`RunReport`]. Only a server
//! that cannot be used at all (bad credentials, unreachable) aborts the run,
//! and even then in-flight uploads finish and queued album additions are sent.

mod albums;
mod error;
mod report;

pub use error::UploadError;
pub use report::{AlbumFailure, AlbumSpec, AssetState, RunReport};

use crate::asset::{CandidateAsset, UploadResult};
use crate::config::UploadOptions;
use crate::remote::{AssetFilter, RemoteClient, RemoteError};
use albums::AlbumRegistry;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use report::Tracker;
use std::collections::HashMap;
use std::future::ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Drives one upload run.
///
/// ```rust,no_run
/// use uplift::config::UploadOptions;
/// use uplift::remote::MemoryClient;
/// use uplift::upload::Uploader;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(candidates: Vec<uplift::asset::CandidateAsset>) -> anyhow::Result<()> {
/// let client = MemoryClient::new();
/// let uploader = Uploader::new(&client, &UploadOptions::default());
/// let report = uploader.run(candidates, CancellationToken::new()).await?;
/// report.log_summary();
/// # Ok(())
/// # }
/// ```
pub struct Uploader<'a> {
    client: &'a dyn RemoteClient,
    concurrency: usize,
    album_batch_size: usize,
    skip_existing: bool,
}

/// Assets the server held before the run, by original file name.
#[derive(Default)]
struct ExistingAssets(HashMap<String, Vec<(String, Option<DateTime<Utc>>)>>);

impl ExistingAssets {
    /// Same name, and taken on the same day when both sides know the date.
    fn find(&self, asset: &CandidateAsset) -> Option<&str> {
        let entries = self.0.get(&asset.name)?;
        entries
            .iter()
            .find(|(_, created)| match (created, asset.created) {
                (Some(theirs), Some(ours)) => theirs.date_naive() == ours.date_naive(),
                _ => true,
            })
            .map(|(id, _)| id.as_str())
    }
}

/// Shared state of one run.
struct Run<'a> {
    registry: AlbumRegistry<'a>,
    tracker: Tracker,
    existing: ExistingAssets,
    /// Stops new submissions after a fatal error; child of the caller's token.
    abort: CancellationToken,
    fatal: Mutex<Option<RemoteError>>,
    started: AtomicUsize,
    total: usize,
}

impl Run<'_> {
    fn set_fatal(&self, error: RemoteError) {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            log::error!("Aborting run: {error}");
            *fatal = Some(error);
        }
        self.abort.cancel();
    }
}

impl<'a> Uploader<'a> {
    pub fn new(client: &'a dyn RemoteClient, options: &UploadOptions) -> Self {
        Self {
            client,
            concurrency: options.concurrency.max(1),
            album_batch_size: options.album_batch_size.max(1),
            skip_existing: options.skip_existing,
        }
    }

    /// Upload every candidate and build its albums.
    ///
    /// Candidates sharing an upload key are the same asset: it is uploaded
    /// once and joins the union of their albums. Cancelling `cancel` stops new
    /// uploads; those already started finish and their album membership is
    /// still sent.
    pub async fn run<I>(&self, candidates: I, cancel: CancellationToken) -> Result<RunReport, UploadError>
    where
        I: IntoIterator<Item = CandidateAsset>,
    {
        let queue = dedup(candidates);
        let tracker = Tracker::default();
        for asset in &queue {
            tracker.set(&asset.upload_key, AssetState::Pending);
        }

        let mut state = Run {
            registry: AlbumRegistry::new(self.client, self.album_batch_size),
            tracker,
            existing: ExistingAssets::default(),
            abort: cancel.child_token(),
            fatal: Mutex::new(None),
            started: AtomicUsize::new(0),
            total: queue.len(),
        };
        if self.skip_existing {
            match self.existing_assets().await {
                Ok(existing) => state.existing = existing,
                Err(e) if e.is_fatal() => state.set_fatal(e),
                Err(e) => log::warn!("Cannot list existing assets, uploading everything: {e}"),
            }
        }

        log::info!("Uploading {} assets (concurrency: {})", state.total, self.concurrency);
        let run = &state;
        stream::iter(queue)
            .take_while(|_| ready(!run.abort.is_cancelled()))
            .map(|asset| self.process(run, asset))
            .buffer_unordered(self.concurrency)
            .for_each(|_| ready(()))
            .await;

        // Queued memberships go out even when the run was cut short.
        run.registry.flush(&run.tracker).await;
        if let Some(e) = run.registry.take_fatal() {
            run.set_fatal(e);
        }
        if cancel.is_cancelled() {
            log::warn!("Upload interrupted");
            run.tracker.set_cancelled();
        }

        let Run { tracker, fatal, .. } = state;
        let report = tracker.into_report();
        report.log_summary();

        match fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(source) => Err(UploadError::Fatal {
                source,
                report: Box::new(report),
            }),
            None => Ok(report),
        }
    }

    async fn existing_assets(&self) -> Result<ExistingAssets, RemoteError> {
        let filter = AssetFilter {
            with_archived: true,
            ..Default::default()
        };
        let assets = self.client.list_assets(&filter).await?;
        log::info!("Server already holds {} assets", assets.len());

        let mut existing = ExistingAssets::default();
        for asset in assets {
            existing
                .0
                .entry(asset.original_file_name)
                .or_default()
                .push((asset.id, asset.file_created_at));
        }
        Ok(existing)
    }

    /// Upload one asset, then join its albums.
    async fn process(&self, run: &Run<'_>, asset: CandidateAsset) {
        let key = asset.upload_key.as_str();
        let n = run.started.fetch_add(1, Ordering::SeqCst) + 1;

        let result = if let Some(id) = run.existing.find(&asset) {
            log::info!("[{n}/{}] Already on server: {key}", run.total);
            run.tracker.set(
                key,
                AssetState::Skipped {
                    reason: "already on server".into(),
                    asset_id: Some(id.to_string()),
                },
            );
            UploadResult {
                asset_id: id.to_string(),
                upload_key: asset.upload_key.clone(),
            }
        } else {
            log::info!("[{n}/{}] Uploading: {key}", run.total);
            run.tracker.set(key, AssetState::Uploading);
            match self.client.upload_asset(&asset).await {
                Ok(resp) => {
                    if resp.duplicate {
                        log::info!("  Server already has {key}");
                    }
                    run.tracker.set(
                        key,
                        AssetState::Uploaded {
                            asset_id: resp.id.clone(),
                            duplicate: resp.duplicate,
                        },
                    );
                    UploadResult {
                        asset_id: resp.id,
                        upload_key: asset.upload_key.clone(),
                    }
                }
                Err(e) => {
                    log::error!("  Upload failed: {key}: {e}");
                    run.tracker.set(key, AssetState::Failed { error: e.to_string() });
                    if e.is_fatal() {
                        run.set_fatal(e);
                    }
                    return;
                }
            }
        };

        for album in &asset.albums {
            run.registry.attach(album, &result, &run.tracker).await;
        }
        if let Some(e) = run.registry.take_fatal() {
            run.set_fatal(e);
        }
    }
}

/// Merge candidates that share an upload key, keeping first-seen order.
fn dedup<I>(candidates: I) -> Vec<CandidateAsset>
where
    I: IntoIterator<Item = CandidateAsset>,
{
    let mut queue: Vec<CandidateAsset> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for asset in candidates {
        match index.get(&asset.upload_key) {
            Some(&i) => {
                log::debug!("Duplicate candidate {}, merging albums", asset.upload_key);
                queue[i].albums.extend(asset.albums);
            }
            None => {
                index.insert(asset.upload_key.clone(), queue.len());
                queue.push(asset);
            }
        }
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryClient, RemoteAsset};
    use crate::scan::MediaKind;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::time::Duration;

    fn candidate(key: &str, albums: &[&str]) -> CandidateAsset {
        CandidateAsset {
            name: key.rsplit('/').next().unwrap().to_string(),
            path: PathBuf::from(key),
            upload_key: key.to_string(),
            kind: MediaKind::Image,
            created: None,
            albums: albums.iter().map(|a| a.to_string()).collect(),
            partner_shared: false,
            description: None,
        }
    }

    fn options(concurrency: usize, batch: usize) -> UploadOptions {
        UploadOptions {
            concurrency,
            album_batch_size: batch,
            ..Default::default()
        }
    }

    fn members(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    // ── uploads ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn uploads_everything_once() {
        let client = MemoryClient::new();
        let candidates = vec![
            candidate("A/x.jpg", &["A"]),
            candidate("B/y.jpg", &[]),
            candidate("A/x.jpg", &["Extra"]),
        ];

        let report = Uploader::new(&client, &options(4, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap();

        let mut uploaded = client.uploaded_keys().await;
        uploaded.sort();
        assert_eq!(uploaded, vec!["A/x.jpg", "B/y.jpg"]);
        assert_eq!(report.uploaded(), 2);

        let albums = client.album_members().await;
        assert_eq!(albums["A"], members(&["A/x.jpg"]));
        assert_eq!(albums["Extra"], members(&["A/x.jpg"]));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let client = MemoryClient::new().with_latency(Duration::from_millis(10));
        let candidates: Vec<_> = (0..12).map(|i| candidate(&format!("f{i}.jpg"), &[])).collect();

        Uploader::new(&client, &options(3, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap();

        assert!(client.peak_concurrency() <= 3);
        assert!(client.peak_concurrency() >= 2);
        assert_eq!(client.uploaded_keys().await.len(), 12);
    }

    #[tokio::test]
    async fn failed_upload_does_not_stop_siblings() {
        let client = MemoryClient::new().fail_upload("A/bad.jpg");
        let candidates = vec![
            candidate("A/bad.jpg", &["A"]),
            candidate("A/good.jpg", &["A"]),
        ];

        let report = Uploader::new(&client, &options(2, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.uploaded(), 1);
        assert_eq!(client.album_members().await["A"], members(&["A/good.jpg"]));
        assert_eq!(report.album_keys("A"), vec!["A/good.jpg"]);
    }

    #[tokio::test]
    async fn server_duplicate_still_joins_albums() {
        let client = MemoryClient::new();
        Uploader::new(&client, &options(1, 50))
            .run(vec![candidate("x.jpg", &[])], CancellationToken::new())
            .await
            .unwrap();

        let report = Uploader::new(&client, &options(1, 50))
            .run(vec![candidate("x.jpg", &["Later"])], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.duplicates(), 1);
        assert_eq!(client.uploaded_keys().await, vec!["x.jpg"]);
        assert_eq!(client.album_members().await["Later"], members(&["x.jpg"]));
    }

    #[tokio::test]
    async fn skip_existing_reuses_server_asset() {
        let taken = Utc.with_ymd_and_hms(2023, 10, 6, 6, 30, 0).unwrap();
        let client = MemoryClient::new().with_assets([RemoteAsset {
            id: "server-1".into(),
            original_file_name: "x.jpg".into(),
            file_created_at: Some(taken),
        }]);
        let mut asset = candidate("Trip/x.jpg", &["Trip"]);
        asset.created = Some(taken);

        let opts = UploadOptions {
            skip_existing: true,
            ..Default::default()
        };
        let report = Uploader::new(&client, &opts)
            .run(vec![asset], CancellationToken::new())
            .await
            .unwrap();

        assert!(client.uploaded_keys().await.is_empty());
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.asset_id("Trip/x.jpg"), Some("server-1"));
        assert_eq!(client.album_members().await["Trip"], members(&["server-1"]));
    }

    // ── albums ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn shared_album_created_once_under_concurrency() {
        let client = MemoryClient::new().with_latency(Duration::from_millis(5));
        let candidates: Vec<_> = (0..20)
            .map(|i| candidate(&format!("Trip/{i:02}.jpg"), &["Trip"]))
            .collect();

        let report = Uploader::new(&client, &options(8, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.created_albums().await, vec!["Trip"]);
        assert_eq!(client.album_members().await["Trip"].len(), 20);
        assert_eq!(report.album_keys("Trip").len(), 20);
        assert!(report.album_failures.is_empty());
    }

    #[tokio::test]
    async fn membership_independent_of_batch_size() {
        let candidates: Vec<_> = (0..7)
            .map(|i| {
                let albums: &[&str] = if i % 2 == 0 { &["Even", "All"] } else { &["All"] };
                candidate(&format!("f{i}.jpg"), albums)
            })
            .collect();

        let mut outcomes = Vec::new();
        for batch in [1, 3, 50] {
            let client = MemoryClient::new();
            Uploader::new(&client, &options(4, batch))
                .run(candidates.clone(), CancellationToken::new())
                .await
                .unwrap();
            outcomes.push(client.album_members().await);
        }
        assert_eq!(outcomes[0], outcomes[1]);
        assert_eq!(outcomes[1], outcomes[2]);
        assert_eq!(outcomes[0]["All"].len(), 7);
        assert_eq!(outcomes[0]["Even"].len(), 4);
    }

    #[tokio::test]
    async fn album_failure_is_reported_not_fatal() {
        let client = MemoryClient::new().fail_album("Broken");
        let candidates = vec![candidate("a.jpg", &["Broken", "Fine"])];

        let report = Uploader::new(&client, &options(1, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.uploaded(), 1);
        assert!(!report.album_failures.is_empty());
        assert_eq!(client.album_members().await["Fine"], members(&["a.jpg"]));
    }

    // ── cancellation and fatal errors ────────────────────────────────

    #[tokio::test]
    async fn cancelled_before_start_uploads_nothing() {
        let client = MemoryClient::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Uploader::new(&client, &options(2, 50))
            .run(vec![candidate("a.jpg", &["A"])], cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.pending(), 1);
        assert!(client.uploaded_keys().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_run_flushes_pending_membership() {
        let client = MemoryClient::new().with_latency(Duration::from_millis(20));
        let candidates: Vec<_> = (0..30)
            .map(|i| candidate(&format!("Trip/{i:02}.jpg"), &["Trip"]))
            .collect();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = Uploader::new(&client, &options(2, 50))
            .run(candidates, cancel)
            .await
            .unwrap();

        let uploaded = client.uploaded_keys().await;
        assert!(report.cancelled);
        assert!(uploaded.len() < 30);
        assert!(report.pending() > 0);
        // Every uploaded asset made it into the album despite the batch never filling.
        assert_eq!(client.album_members().await["Trip"].len(), uploaded.len());
    }

    #[tokio::test]
    async fn unauthorized_aborts_with_report() {
        let client = MemoryClient::new().reject_credentials();
        let candidates = vec![candidate("a.jpg", &[]), candidate("b.jpg", &[])];

        let err = Uploader::new(&client, &options(1, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap_err();

        let UploadError::Fatal { source, report } = err else {
            panic!("expected a fatal error");
        };
        assert!(source.is_fatal());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.pending(), 1);
    }

    #[tokio::test]
    async fn unauthorized_album_call_aborts_the_run() {
        let client = MemoryClient::new().reject_album_credentials();
        let candidates = vec![
            candidate("a.jpg", &["Trip"]),
            candidate("b.jpg", &["Trip"]),
            candidate("c.jpg", &["Trip"]),
        ];

        let err = Uploader::new(&client, &options(1, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap_err();

        let UploadError::Fatal { source, report } = err else {
            panic!("expected a fatal error");
        };
        assert!(matches!(source, RemoteError::Unauthorized { .. }));
        assert_eq!(report.uploaded(), 1);
        assert_eq!(report.pending(), 2);
        assert!(!report.album_failures.is_empty());
        assert_eq!(client.uploaded_keys().await, vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn transient_album_listing_failure_spares_other_albums() {
        let client = MemoryClient::new().fail_album_listings(1);
        let candidates = vec![
            candidate("A/1.jpg", &["A"]),
            candidate("B/1.jpg", &["B"]),
            candidate("C/1.jpg", &["C"]),
            candidate("C/2.jpg", &["C"]),
        ];

        let report = Uploader::new(&client, &options(1, 50))
            .run(candidates, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.uploaded(), 4);
        assert_eq!(client.created_albums().await, vec!["B", "C"]);
        assert_eq!(report.album_keys("C"), vec!["C/1.jpg", "C/2.jpg"]);
        assert!(report.album_failures.iter().all(|f| f.album == "A"));
    }
}
