//! Local asset discovery.
//!
//! The [`Scanner`] walks one or more roots and yields [`RawFile`] descriptors
//! lazily. Media files are recognised by extension; JSON files are surfaced as
//! [`FileKind::Metadata`] so the Takeout matcher can pair them with media.
//! Everything else is skipped.
//!
//! Folder names are kept exactly as they appear on disk. Grouping and album
//! naming policies are applied further up the pipeline.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp",
    "tif", "tiff",
    "heic", "heif", "avif",
    // RAW formats
    "dng", "cr2", "cr3", "nef", "arw", "raf", "orf", "rw2", "pef", "srw",
];

/// Supported video extensions.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "3gp", "avi", "mkv", "mts", "m2ts", "webm", "mpg", "mpeg",
];

/// Extension of metadata sidecars.
const METADATA_EXTENSION: &str = "json";

/// Broad media category of a file, determined by its extension.
///
/// ```rust
/// use uplift::scan::MediaKind;
/// use std::path::Path;
///
/// assert_eq!(MediaKind::from_path(Path::new("IMG_0001.HEIC")), Some(MediaKind::Image));
/// assert_eq!(MediaKind::from_path(Path::new("PXL_1.LS.mp4")), Some(MediaKind::Video));
/// assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Determine the media kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = lowercase_extension(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// MIME type sent alongside the file bytes on upload.
    pub fn mime_type(&self, path: &Path) -> &'static str {
        let ext = lowercase_extension(path).unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "heic" => "image/heic",
            "heif" => "image/heif",
            "avif" => "image/avif",
            "dng" => "image/x-adobe-dng",
            "cr2" => "image/x-canon-cr2",
            "cr3" => "image/x-canon-cr3",
            "nef" => "image/x-nikon-nef",
            "arw" => "image/x-sony-arw",
            "raf" => "image/x-fuji-raf",
            "orf" => "image/x-olympus-orf",
            "rw2" => "image/x-panasonic-rw2",
            "pef" => "image/x-pentax-pef",
            "srw" => "image/x-samsung-srw",
            "mp4" | "m4v" => "video/mp4",
            "mov" => "video/quicktime",
            "3gp" => "video/3gpp",
            "avi" => "video/x-msvideo",
            "mkv" => "video/x-matroska",
            "mts" | "m2ts" => "video/mp2t",
            "webm" => "video/webm",
            "mpg" | "mpeg" => "video/mpeg",
            _ => match self {
                Self::Image => "application/octet-stream",
                Self::Video => "video/mp4",
            },
        }
    }
}

/// What the scanner found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Media(MediaKind),
    /// A `.json` file; only meaningful to the Takeout matcher.
    Metadata,
}

impl FileKind {
    fn from_path(path: &Path) -> Option<Self> {
        if let Some(kind) = MediaKind::from_path(path) {
            return Some(Self::Media(kind));
        }
        match lowercase_extension(path) {
            Some(ext) if ext == METADATA_EXTENSION => Some(Self::Metadata),
            _ => None,
        }
    }
}

/// A file discovered under a scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// Path on disk, as reachable from the current directory.
    pub path: PathBuf,
    /// Base name of the file.
    pub name: String,
    /// Folder names between the scan root and the file, outermost first.
    /// Empty when the root itself is the file or the file sits directly
    /// under the root.
    pub ancestors: Vec<String>,
    pub kind: FileKind,
}

impl RawFile {
    /// Folder-qualified name: `Folder/Sub/name.jpg`, or just `name.jpg`
    /// when there are no ancestors.
    pub fn upload_key(&self) -> String {
        if self.ancestors.is_empty() {
            return self.name.clone();
        }
        let mut key = self.ancestors.join("/");
        key.push('/');
        key.push_str(&self.name);
        key
    }

    /// Name of the folder immediately containing the file.
    pub fn parent_folder(&self) -> Option<&str> {
        self.ancestors.last().map(String::as_str)
    }

    /// Name of the first folder below the scan root.
    pub fn top_folder(&self) -> Option<&str> {
        self.ancestors.first().map(String::as_str)
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        match self.kind {
            FileKind::Media(kind) => Some(kind),
            FileKind::Metadata => None,
        }
    }
}

/// A path the scanner could not turn into a [`RawFile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanIssue {
    #[error("path does not exist: {}", path.display())]
    Missing { path: PathBuf },
    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("skipping non UTF-8 path: {}", path.display())]
    NonUtf8 { path: PathBuf },
}

/// Lazy, restartable enumeration of media under a set of roots.
///
/// Each call to [`Scanner::files`] starts a fresh walk, so the sequence can be
/// replayed as long as the filesystem underneath does not change. Entries are
/// sorted by file name within each directory.
///
/// ```rust,no_run
/// use uplift::scan::Scanner;
///
/// let scanner = Scanner::new(["./photos", "./IMG_0001.jpg"]);
/// for file in scanner.files().flatten() {
///     println!("{}", file.upload_key());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    roots: Vec<PathBuf>,
}

impl Scanner {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Walk every root in order.
    pub fn files(&self) -> impl Iterator<Item = Result<RawFile, ScanIssue>> + '_ {
        self.roots.iter().flat_map(|root| scan_root(root))
    }
}

fn scan_root(root: &Path) -> Box<dyn Iterator<Item = Result<RawFile, ScanIssue>> + '_> {
    if root.is_file() {
        return Box::new(single_file(root).into_iter());
    }
    if !root.is_dir() {
        log::warn!("Path does not exist: {}", root.display());
        return Box::new(std::iter::once(Err(ScanIssue::Missing {
            path: root.to_path_buf(),
        })));
    }

    let walk = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    return None;
                }
                describe(root, entry.path())
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                log::warn!("Cannot read {}: {e}", path.display());
                Some(Err(ScanIssue::Unreadable {
                    path,
                    reason: e.to_string(),
                }))
            }
        });
    Box::new(walk)
}

/// A bare file root: no ancestors, and unsupported files are skipped the
/// same way they are inside a directory.
fn single_file(path: &Path) -> Option<Result<RawFile, ScanIssue>> {
    let kind = FileKind::from_path(path);
    if kind.is_none() {
        log::warn!("Skipping unsupported file: {}", path.display());
        return None;
    }
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => {
            return Some(Err(ScanIssue::NonUtf8 {
                path: path.to_path_buf(),
            }));
        }
    };
    kind.map(|kind| {
        Ok(RawFile {
            path: path.to_path_buf(),
            name,
            ancestors: Vec::new(),
            kind,
        })
    })
}

fn describe(root: &Path, path: &Path) -> Option<Result<RawFile, ScanIssue>> {
    let Some(kind) = FileKind::from_path(path) else {
        log::debug!("Skipping non-media file: {}", path.display());
        return None;
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            match part.to_str() {
                Some(s) => parts.push(s.to_string()),
                None => {
                    log::warn!("Skipping non UTF-8 path: {}", path.display());
                    return Some(Err(ScanIssue::NonUtf8 {
                        path: path.to_path_buf(),
                    }));
                }
            }
        }
    }
    let name = parts.pop()?;

    Some(Ok(RawFile {
        path: path.to_path_buf(),
        name,
        ancestors: parts,
        kind,
    }))
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"fake").unwrap();
    }

    fn collect(scanner: &Scanner) -> Vec<RawFile> {
        scanner.files().filter_map(Result::ok).collect()
    }

    // ── MediaKind ────────────────────────────────────────────────────

    #[test]
    fn media_kind_images() {
        for name in ["a.jpg", "a.JPEG", "a.png", "a.heic", "a.dng", "a.CR3"] {
            assert_eq!(MediaKind::from_path(Path::new(name)), Some(MediaKind::Image), "{name}");
        }
    }

    #[test]
    fn media_kind_videos() {
        for name in ["a.mp4", "a.MOV", "PXL_20231006_063909898.LS.mp4", "a.3gp"] {
            assert_eq!(MediaKind::from_path(Path::new(name)), Some(MediaKind::Video), "{name}");
        }
    }

    #[test]
    fn media_kind_unsupported() {
        assert_eq!(MediaKind::from_path(Path::new("doc.pdf")), None);
        assert_eq!(MediaKind::from_path(Path::new("a.jpg.json")), None);
        assert_eq!(MediaKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn mime_types() {
        assert_eq!(MediaKind::Image.mime_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(MediaKind::Image.mime_type(Path::new("a.heic")), "image/heic");
        assert_eq!(MediaKind::Video.mime_type(Path::new("a.mov")), "video/quicktime");
        assert_eq!(MediaKind::Video.mime_type(Path::new("a.mp4")), "video/mp4");
    }

    // ── RawFile ──────────────────────────────────────────────────────

    #[test]
    fn upload_key_with_and_without_ancestors() {
        let mut file = RawFile {
            path: PathBuf::from("/x/AlbumA/a.jpg"),
            name: "a.jpg".into(),
            ancestors: vec![],
            kind: FileKind::Media(MediaKind::Image),
        };
        assert_eq!(file.upload_key(), "a.jpg");
        assert_eq!(file.parent_folder(), None);

        file.ancestors = vec!["Google\u{a0}Photos".into(), "Trip".into()];
        assert_eq!(file.upload_key(), "Google\u{a0}Photos/Trip/a.jpg");
        assert_eq!(file.parent_folder(), Some("Trip"));
        assert_eq!(file.top_folder(), Some("Google\u{a0}Photos"));
    }

    // ── Scanner ──────────────────────────────────────────────────────

    #[test]
    fn single_file_root_has_no_ancestors() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("low").join("PXL_20231006_063000139.jpg");
        touch(&jpg);

        let files = collect(&Scanner::new([jpg.clone()]));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, jpg);
        assert!(files[0].ancestors.is_empty());
        assert_eq!(files[0].upload_key(), "PXL_20231006_063000139.jpg");
    }

    #[test]
    fn directory_root_keeps_relative_chain() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("AlbumA/one.jpg"));
        touch(&dir.path().join("AlbumB/deep/two.mp4"));
        touch(&dir.path().join("AlbumB/readme.txt"));

        let keys: Vec<String> = collect(&Scanner::new([dir.path()]))
            .iter()
            .map(RawFile::upload_key)
            .collect();
        assert_eq!(keys, vec!["AlbumA/one.jpg", "AlbumB/deep/two.mp4"]);
    }

    #[test]
    fn folder_names_are_not_normalized() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("Google\u{a0}Photos/Trip/a.jpg"));
        touch(&dir.path().join("Google Photos/Trip/b.mp4"));

        let files = collect(&Scanner::new([dir.path()]));
        let tops: Vec<&str> = files.iter().filter_map(RawFile::top_folder).collect();
        assert!(tops.contains(&"Google\u{a0}Photos"));
        assert!(tops.contains(&"Google Photos"));
    }

    #[test]
    fn json_files_are_metadata() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("a.jpg.json"));

        let files = collect(&Scanner::new([dir.path()]));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].kind, FileKind::Media(MediaKind::Image));
        assert_eq!(files[1].kind, FileKind::Metadata);
        assert_eq!(files[1].media_kind(), None);
    }

    #[test]
    fn missing_root_is_reported() {
        let scanner = Scanner::new(["/nonexistent/uplift/path"]);
        let results: Vec<_> = scanner.files().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ScanIssue::Missing { .. })));
    }

    #[test]
    fn unsupported_single_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("readme.txt");
        touch(&txt);
        assert!(collect(&Scanner::new([txt])).is_empty());
    }

    #[test]
    fn files_can_be_replayed() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("sub/b.png"));

        let scanner = Scanner::new([dir.path()]);
        let first = collect(&scanner);
        let second = collect(&scanner);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn multiple_roots_are_walked_in_order() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one/x.jpg"));
        touch(&dir.path().join("two/y.jpg"));

        let scanner = Scanner::new([dir.path().join("two"), dir.path().join("one")]);
        let names: Vec<String> = collect(&scanner).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["y.jpg", "x.jpg"]);
    }
}
