//! End-to-end flow: scan the roots, assign albums, upload.
//!
//! [`discover`] is the synchronous half and never touches the server, which
//! makes it useful on its own for previews. [`run`] adds the upload.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::asset::CandidateAsset;
use crate::config::UploadOptions;
use crate::policy::AlbumPolicy;
use crate::remote::RemoteClient;
use crate::scan::{RawFile, ScanIssue, Scanner};
use crate::takeout::{MatchIssue, TakeoutMatcher};
use crate::upload::{RunReport, UploadError, Uploader};

/// Candidates found under the roots, with everything that went wrong
/// finding them.
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<CandidateAsset>,
    pub scan_issues: Vec<ScanIssue>,
    pub match_issues: Vec<MatchIssue>,
    /// Upload keys of partner-shared assets left out by configuration.
    pub discarded_partner: Vec<String>,
}

impl Discovery {
    fn absorb_into(self, report: &mut RunReport) {
        report.scan_issues.extend(self.scan_issues);
        report.match_issues.extend(self.match_issues);
        report.discarded_partner.extend(self.discarded_partner);
    }
}

/// Scan `roots` and decide the albums of every media file.
///
/// With `google_photos` set the roots are read as a Takeout export, one root
/// per archive part; otherwise as plain folders.
///
/// ```rust,no_run
/// use uplift::config::UploadOptions;
/// use uplift::pipeline::discover;
/// use std::path::PathBuf;
///
/// let mut options = UploadOptions::default();
/// options.set_create_album_folder(true);
/// let found = discover(&[PathBuf::from("./photos")], &options);
/// for asset in &found.candidates {
///     println!("{} -> {:?}", asset.upload_key, asset.albums);
/// }
/// ```
pub fn discover(roots: &[PathBuf], options: &UploadOptions) -> Discovery {
    let scanner = Scanner::new(roots.iter().cloned());
    let policy = AlbumPolicy::from_options(options);

    let mut discovery = Discovery::default();
    let mut files: Vec<RawFile> = Vec::new();
    for entry in scanner.files() {
        match entry {
            Ok(file) => files.push(file),
            Err(issue) => discovery.scan_issues.push(issue),
        }
    }
    log::info!("Found {} files under {} roots", files.len(), roots.len());

    if policy.is_takeout() {
        let matched = TakeoutMatcher::new(options.takeout()).match_files(files);
        discovery.candidates = matched
            .candidates
            .into_iter()
            .map(|asset| policy.resolve(asset))
            .collect();
        discovery.match_issues = matched.issues;
        discovery.discarded_partner = matched.discarded_partner;
    } else {
        discovery.candidates = files.iter().filter_map(|raw| policy.resolve_raw(raw)).collect();
    }
    discovery
}

/// Discover and upload.
///
/// Discovery problems never stop the run; they end up in the returned report,
/// including the partial report of a [`UploadError::Fatal`].
///
/// ```rust,no_run
/// use uplift::config::UploadOptions;
/// use uplift::pipeline;
/// use uplift::remote::MemoryClient;
/// use tokio_util::sync::CancellationToken;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = MemoryClient::new();
/// let roots = [PathBuf::from("./photos")];
/// let report = pipeline::run(&client, &roots, &UploadOptions::default(), CancellationToken::new()).await?;
/// println!("{} uploaded", report.uploaded());
/// # Ok(())
/// # }
/// ```
pub async fn run(
    client: &dyn RemoteClient,
    roots: &[PathBuf],
    options: &UploadOptions,
    cancel: CancellationToken,
) -> Result<RunReport, UploadError> {
    options.validate()?;

    let mut discovery = discover(roots, options);
    let candidates = std::mem::take(&mut discovery.candidates);

    match Uploader::new(client, options).run(candidates, cancel).await {
        Ok(mut report) => {
            discovery.absorb_into(&mut report);
            Ok(report)
        }
        Err(UploadError::Fatal { source, mut report }) => {
            discovery.absorb_into(&mut report);
            Err(UploadError::Fatal { source, report })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FolderAlbums;
    use crate::remote::MemoryClient;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"fake").unwrap();
    }

    fn albums_of<'a>(found: &'a Discovery, key: &str) -> Vec<&'a str> {
        let asset = found
            .candidates
            .iter()
            .find(|a| a.upload_key == key)
            .unwrap_or_else(|| panic!("no candidate {key}"));
        asset.albums.iter().map(String::as_str).collect()
    }

    // ── discover ─────────────────────────────────────────────────────

    #[test]
    fn folder_mode_skips_sidecars() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("Trip/a.jpg"));
        touch(&tmp.path().join("Trip/a.jpg.json"));
        touch(&tmp.path().join("notes.txt"));

        let found = discover(&[tmp.path().to_path_buf()], &UploadOptions::default());
        assert_eq!(found.candidates.len(), 1);
        assert!(albums_of(&found, "Trip/a.jpg").is_empty());
    }

    #[test]
    fn folder_albums_leaf_and_top() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("2023/Trip/a.jpg"));
        touch(&tmp.path().join("b.jpg"));
        let roots = [tmp.path().to_path_buf()];

        let mut options = UploadOptions::default();
        options.folder_albums = FolderAlbums::Leaf;
        let found = discover(&roots, &options);
        assert_eq!(albums_of(&found, "2023/Trip/a.jpg"), vec!["Trip"]);
        assert!(albums_of(&found, "b.jpg").is_empty());

        options.folder_albums = FolderAlbums::Top;
        let found = discover(&roots, &options);
        assert_eq!(albums_of(&found, "2023/Trip/a.jpg"), vec!["2023"]);
    }

    #[test]
    fn fixed_album_wins_over_folders() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("Trip/a.jpg"));
        touch(&tmp.path().join("b.mp4"));

        let options = UploadOptions {
            album: Some("Everything".into()),
            folder_albums: FolderAlbums::Leaf,
            ..Default::default()
        };
        let found = discover(&[tmp.path().to_path_buf()], &options);
        assert_eq!(albums_of(&found, "Trip/a.jpg"), vec!["Everything"]);
        assert_eq!(albums_of(&found, "b.mp4"), vec!["Everything"]);
    }

    #[test]
    fn missing_root_is_a_scan_issue() {
        let tmp = TempDir::new().unwrap();
        let found = discover(&[tmp.path().join("gone")], &UploadOptions::default());
        assert!(found.candidates.is_empty());
        assert!(matches!(found.scan_issues[..], [ScanIssue::Missing { .. }]));
    }

    #[test]
    fn takeout_mode_uses_album_metadata() {
        let tmp = TempDir::new().unwrap();
        let album = tmp.path().join("Takeout/Google Photos/Summer");
        touch(&album.join("a.jpg"));
        fs::write(album.join("metadata.json"), r#"{"title": "Summer 2023"}"#).unwrap();
        fs::write(
            album.join("a.jpg.json"),
            r#"{"title": "a.jpg", "photoTakenTime": {"timestamp": "1696573800"}}"#,
        )
        .unwrap();

        let options = UploadOptions {
            google_photos: true,
            ..Default::default()
        };
        let found = discover(&[tmp.path().to_path_buf()], &options);
        assert_eq!(albums_of(&found, "Takeout/Google Photos/Summer/a.jpg"), vec!["Summer 2023"]);
        assert!(found.match_issues.is_empty());
    }

    // ── run ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn run_rejects_invalid_options() {
        let client = MemoryClient::new();
        let options = UploadOptions {
            concurrency: 0,
            ..Default::default()
        };
        let err = run(&client, &[], &options, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[tokio::test]
    async fn run_reports_discovery_issues() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("Trip/a.jpg"));
        let roots = [tmp.path().to_path_buf(), tmp.path().join("gone")];

        let mut options = UploadOptions::default();
        options.set_create_album_folder(true);
        let client = MemoryClient::new();
        let report = run(&client, &roots, &options, CancellationToken::new()).await.unwrap();

        assert_eq!(report.uploaded(), 1);
        assert_eq!(report.scan_issues.len(), 1);
        assert!(report.has_errors());
        assert_eq!(report.album_keys("Trip"), vec!["Trip/a.jpg"]);
    }

    #[tokio::test]
    async fn fatal_report_keeps_discovery_issues() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a.jpg"));
        let roots = [tmp.path().to_path_buf(), tmp.path().join("gone")];

        let client = MemoryClient::new().reject_credentials();
        let err = run(&client, &roots, &UploadOptions::default(), CancellationToken::new())
            .await
            .unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.scan_issues.len(), 1);
        assert_eq!(report.failed(), 1);
    }
}
