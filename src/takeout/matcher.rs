use super::names::{
    base_stem, is_album_metadata_name, is_truncated_sidecar, is_untitled_placeholder,
    normalize_whitespace, sidecar_candidates,
};
use super::sidecar::{MatchIssue, MetadataSidecar, Sidecar, read_sidecar};
use super::TakeoutOptions;
use crate::asset::CandidateAsset;
use crate::exif;
use crate::scan::{FileKind, MediaKind, RawFile};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// Everything the matcher produced from one pass over an export.
#[derive(Debug, Default)]
pub struct MatchOutput {
    pub candidates: Vec<CandidateAsset>,
    pub issues: Vec<MatchIssue>,
    /// Upload keys of partner-shared assets dropped by `keep_partner = false`.
    pub discarded_partner: Vec<String>,
}

/// Turns the raw files of one or more Takeout parts into album-tagged
/// candidates.
///
/// Folders whose names differ only in whitespace (`Google Photos` and
/// `Google\u{a0}Photos`) are one logical folder. A file present in several
/// parts is kept once, from the first part scanned, and picks up its sidecar
/// from whichever part holds it.
///
/// ```rust
/// use uplift::scan::{FileKind, MediaKind, RawFile};
/// use uplift::takeout::{TakeoutMatcher, TakeoutOptions};
///
/// let file = RawFile {
///     path: "Takeout/Google Photos/Photos from 2023/a.jpg".into(),
///     name: "a.jpg".into(),
///     ancestors: vec!["Google Photos".into(), "Photos from 2023".into()],
///     kind: FileKind::Media(MediaKind::Image),
/// };
/// let out = TakeoutMatcher::new(TakeoutOptions::default()).match_files([file]);
/// assert_eq!(out.candidates.len(), 1);
/// assert!(out.candidates[0].albums.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TakeoutMatcher {
    options: TakeoutOptions,
}

/// Files sharing one normalized folder path.
struct FolderGroup {
    /// Normalized name of the innermost folder; `None` at the scan root.
    folder_name: Option<String>,
    media: Vec<RawFile>,
    media_names: HashSet<String>,
    /// Sidecar file name to the first path seen with that name.
    sidecars: BTreeMap<String, PathBuf>,
    album_metadata: Vec<PathBuf>,
}

impl FolderGroup {
    fn new(file: &RawFile) -> Self {
        Self {
            folder_name: file.parent_folder().map(normalize_whitespace),
            media: Vec::new(),
            media_names: HashSet::new(),
            sidecars: BTreeMap::new(),
            album_metadata: Vec::new(),
        }
    }

    fn add(&mut self, file: RawFile) {
        match file.kind {
            FileKind::Metadata if is_album_metadata_name(&file.name) => {
                self.album_metadata.push(file.path);
            }
            FileKind::Metadata => {
                self.sidecars.entry(file.name).or_insert(file.path);
            }
            FileKind::Media(_) => {
                if self.media_names.insert(normalize_whitespace(&file.name)) {
                    self.media.push(file);
                } else {
                    log::debug!("Already seen in another part, skipping {}", file.path.display());
                }
            }
        }
    }

    fn find_sidecar(&self, name: &str) -> Option<&PathBuf> {
        for candidate in sidecar_candidates(name) {
            if let Some(path) = self.sidecars.get(&candidate) {
                return Some(path);
            }
        }
        self.sidecars
            .iter()
            .find(|(sidecar, _)| is_truncated_sidecar(name, sidecar))
            .map(|(_, path)| path)
    }

    /// A live-photo video shares the sidecar of its still image.
    fn find_companion_sidecar(&self, video: &RawFile) -> Option<&PathBuf> {
        let stem = base_stem(&video.name);
        self.media
            .iter()
            .filter(|m| m.media_kind() == Some(MediaKind::Image) && base_stem(&m.name) == stem)
            .find_map(|image| self.find_sidecar(&image.name))
    }
}

impl TakeoutMatcher {
    pub fn new(options: TakeoutOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TakeoutOptions {
        &self.options
    }

    /// Consume a scan and produce upload candidates.
    pub fn match_files<I>(&self, files: I) -> MatchOutput
    where
        I: IntoIterator<Item = RawFile>,
    {
        let mut groups: Vec<FolderGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for file in files {
            let key = group_key(&file.ancestors);
            let idx = *index.entry(key).or_insert_with(|| {
                groups.push(FolderGroup::new(&file));
                groups.len() - 1
            });
            groups[idx].add(file);
        }

        let mut out = MatchOutput::default();
        for group in &groups {
            self.resolve_group(group, &mut out);
        }
        log::info!(
            "Matched {} assets in {} folders ({} sidecar issues, {} partner assets discarded)",
            out.candidates.len(),
            groups.len(),
            out.issues.len(),
            out.discarded_partner.len()
        );
        out
    }

    fn resolve_group(&self, group: &FolderGroup, out: &mut MatchOutput) {
        let folder_album = self.folder_album(group, &mut out.issues);

        for file in &group.media {
            let Some(kind) = file.media_kind() else {
                continue;
            };
            let sidecar = self.media_sidecar(group, file, kind, &mut out.issues);
            let partner = sidecar.as_ref().is_some_and(|s| s.partner_shared);

            if partner && !self.options.keep_partner {
                let key = file.upload_key();
                log::info!("Discarding partner-shared asset {key}");
                out.discarded_partner.push(key);
                continue;
            }

            let created = sidecar
                .as_ref()
                .and_then(|s| s.taken_time)
                .or_else(|| exif::created_time(&file.path, kind));
            let mut asset = CandidateAsset::with_created(file, kind, created);
            asset.partner_shared = partner;
            asset.description = sidecar
                .map(|s| s.description)
                .filter(|d| !d.trim().is_empty());

            if let Some(album) = &folder_album {
                asset.albums.insert(album.clone());
            }
            if partner {
                if let Some(album) = &self.options.partner_album {
                    asset.albums.insert(album.clone());
                }
            }
            out.candidates.push(asset);
        }
    }

    /// Album the folder itself maps to, if any.
    fn folder_album(&self, group: &FolderGroup, issues: &mut Vec<MatchIssue>) -> Option<String> {
        let folder = group.folder_name.as_deref()?;
        let title = album_title(group, issues);

        let untitled = match &title {
            Some(title) => title.trim().is_empty() || is_untitled_placeholder(title),
            None => is_untitled_placeholder(folder),
        };
        if untitled {
            if self.options.keep_untitled_albums {
                return Some(folder.to_string());
            }
            log::debug!("Untitled album folder '{folder}' ignored");
            return None;
        }

        let title = title?;
        if self.options.use_album_folder_as_name {
            Some(folder.to_string())
        } else {
            Some(title)
        }
    }

    fn media_sidecar(
        &self,
        group: &FolderGroup,
        file: &RawFile,
        kind: MediaKind,
        issues: &mut Vec<MatchIssue>,
    ) -> Option<MetadataSidecar> {
        let path = group.find_sidecar(&file.name).or_else(|| match kind {
            MediaKind::Video => group.find_companion_sidecar(file),
            MediaKind::Image => None,
        });
        let Some(path) = path else {
            log::debug!("No sidecar for {}", file.path.display());
            issues.push(MatchIssue::MissingSidecar {
                path: file.path.clone(),
            });
            return None;
        };

        match read_sidecar(path) {
            Ok(Sidecar::Media(meta)) => Some(meta),
            Ok(Sidecar::Album(_)) => None,
            Err(issue) => {
                log::warn!("{issue}");
                issues.push(issue);
                None
            }
        }
    }
}

/// Title from the first readable album metadata file of a folder.
fn album_title(group: &FolderGroup, issues: &mut Vec<MatchIssue>) -> Option<String> {
    for path in &group.album_metadata {
        match read_sidecar(path) {
            Ok(Sidecar::Album(meta)) => return Some(meta.title),
            Ok(Sidecar::Media(_)) => {}
            Err(issue) => {
                log::warn!("{issue}");
                issues.push(issue);
            }
        }
    }
    None
}

fn group_key(ancestors: &[String]) -> String {
    ancestors
        .iter()
        .map(|a| normalize_whitespace(a))
        .collect::<Vec<_>>()
        .join("/")
}
