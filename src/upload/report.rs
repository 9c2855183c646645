use crate::asset::UploadResult;
use crate::scan::ScanIssue;
use crate::takeout::MatchIssue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where an asset ended up.
///
/// `Pending` assets at the end of a run were never attempted because the run
/// was cancelled or aborted first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssetState {
    Pending,
    Uploading,
    Uploaded {
        asset_id: String,
        /// The server already had the file.
        duplicate: bool,
    },
    /// Not uploaded on purpose. `asset_id` is set when an existing server
    /// asset stands in for it.
    Skipped {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        asset_id: Option<String>,
    },
    Failed {
        error: String,
    },
}

/// An album touched during the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlbumSpec {
    pub name: String,
    pub remote_id: Option<String>,
    /// Created by this run rather than found on the server.
    pub created: bool,
    /// Confirmed members, in the order they joined.
    pub members: Vec<UploadResult>,
}

/// Something went wrong with an album. `upload_key` is `None` when the album
/// itself could not be created or found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumFailure {
    pub album: String,
    pub upload_key: Option<String>,
    pub error: String,
}

/// Everything that happened during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub assets: BTreeMap<String, AssetState>,
    pub albums: BTreeMap<String, AlbumSpec>,
    pub album_failures: Vec<AlbumFailure>,
    pub scan_issues: Vec<ScanIssue>,
    pub match_issues: Vec<MatchIssue>,
    /// Partner-shared assets left out by configuration.
    pub discarded_partner: Vec<String>,
    /// The run was interrupted before every asset was attempted.
    pub cancelled: bool,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&AssetState) -> bool) -> usize {
        self.assets.values().filter(|s| pred(s)).count()
    }

    /// Newly stored on the server.
    pub fn uploaded(&self) -> usize {
        self.count(|s| matches!(s, AssetState::Uploaded { duplicate: false, .. }))
    }

    /// Already on the server, reported as duplicates on upload.
    pub fn duplicates(&self) -> usize {
        self.count(|s| matches!(s, AssetState::Uploaded { duplicate: true, .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, AssetState::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, AssetState::Failed { .. }))
    }

    /// Never attempted.
    pub fn pending(&self) -> usize {
        self.count(|s| matches!(s, AssetState::Pending | AssetState::Uploading))
    }

    /// Upload key and error of every failed upload.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assets.iter().filter_map(|(key, state)| match state {
            AssetState::Failed { error } => Some((key.as_str(), error.as_str())),
            _ => None,
        })
    }

    /// Asset id an upload key resolved to, if it reached the server.
    pub fn asset_id(&self, upload_key: &str) -> Option<&str> {
        match self.assets.get(upload_key)? {
            AssetState::Uploaded { asset_id, .. } => Some(asset_id.as_str()),
            AssetState::Skipped { asset_id, .. } => asset_id.as_deref(),
            _ => None,
        }
    }

    /// Upload keys of the confirmed members of an album.
    pub fn album_keys(&self, album: &str) -> Vec<&str> {
        self.albums
            .get(album)
            .map(|spec| spec.members.iter().map(|m| m.upload_key.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        self.failed() > 0
            || !self.album_failures.is_empty()
            || !self.scan_issues.is_empty()
            || self.match_issues.iter().any(|i| !matches!(i, MatchIssue::MissingSidecar { .. }))
    }

    pub fn log_summary(&self) {
        log::info!("── Summary ──");
        log::info!(
            "  {} uploaded, {} already on server, {} skipped, {} failed, {} total",
            self.uploaded(),
            self.duplicates(),
            self.skipped(),
            self.failed(),
            self.assets.len()
        );
        let created = self.albums.values().filter(|a| a.created).count();
        log::info!(
            "  {} albums ({} created), {} album errors",
            self.albums.len(),
            created,
            self.album_failures.len()
        );
        if !self.discarded_partner.is_empty() {
            log::info!("  {} partner-shared assets discarded", self.discarded_partner.len());
        }
        if !self.scan_issues.is_empty() || !self.match_issues.is_empty() {
            log::info!(
                "  {} scan issues, {} sidecar issues",
                self.scan_issues.len(),
                self.match_issues.len()
            );
        }
        if self.cancelled {
            log::warn!("  interrupted: {} assets not attempted", self.pending());
        }
        for (key, error) in self.failures() {
            log::error!("Upload failed: {key}: {error}");
        }
        for failure in &self.album_failures {
            match &failure.upload_key {
                Some(key) => log::error!("Album '{}': {key}: {}", failure.album, failure.error),
                None => log::error!("Album '{}': {}", failure.album, failure.error),
            }
        }
    }
}

/// Shared, lock-protected report that workers update while the run is going.
#[derive(Debug, Default)]
pub(crate) struct Tracker(Mutex<RunReport>);

impl Tracker {
    fn lock(&self) -> MutexGuard<'_, RunReport> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, upload_key: &str, state: AssetState) {
        self.lock().assets.insert(upload_key.to_string(), state);
    }

    pub(crate) fn album_bound(&self, name: &str, remote_id: &str, created: bool) {
        let mut report = self.lock();
        let spec = album_entry(&mut report, name);
        spec.remote_id = Some(remote_id.to_string());
        spec.created = created;
    }

    pub(crate) fn album_joined(&self, name: &str, member: &UploadResult) {
        let mut report = self.lock();
        album_entry(&mut report, name).members.push(member.clone());
    }

    pub(crate) fn album_failed(&self, name: &str, upload_key: Option<&str>, error: impl Into<String>) {
        let error = error.into();
        match upload_key {
            Some(key) => log::warn!("Cannot add {key} to album '{name}': {error}"),
            None => log::warn!("Album '{name}': {error}"),
        }
        self.lock().album_failures.push(AlbumFailure {
            album: name.to_string(),
            upload_key: upload_key.map(str::to_string),
            error,
        });
    }

    pub(crate) fn set_cancelled(&self) {
        self.lock().cancelled = true;
    }

    pub(crate) fn into_report(self) -> RunReport {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

fn album_entry<'a>(report: &'a mut RunReport, name: &str) -> &'a mut AlbumSpec {
    report
        .albums
        .entry(name.to_string())
        .or_insert_with(|| AlbumSpec {
            name: name.to_string(),
            ..Default::default()
        })
}
