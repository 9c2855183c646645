//! Album assignment.
//!
//! Decides the final album set of every asset. Plain folders get their albums
//! from the `album` override or from folder names; Takeout exports arrive
//! with albums already assigned by the matcher and pass through untouched.

use crate::asset::CandidateAsset;
use crate::config::{FolderAlbums, UploadOptions};
use crate::scan::RawFile;

/// Which rule assigns albums for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumPolicy {
    /// Every asset goes into this one album.
    Fixed(String),
    /// Albums come from folder names, or not at all.
    Folders(FolderAlbums),
    /// The Takeout matcher already decided.
    Takeout,
}

impl AlbumPolicy {
    pub fn from_options(options: &UploadOptions) -> Self {
        if options.google_photos {
            if let Some(album) = &options.album {
                log::warn!("Album override '{album}' is ignored for Google Photos exports");
            }
            return Self::Takeout;
        }
        match &options.album {
            Some(album) => Self::Fixed(album.clone()),
            None => Self::Folders(options.folder_albums),
        }
    }

    pub fn is_takeout(&self) -> bool {
        matches!(self, Self::Takeout)
    }

    /// Build the candidate for a plain-folder file. Returns `None` for
    /// anything that is not media.
    pub fn resolve_raw(&self, raw: &RawFile) -> Option<CandidateAsset> {
        let kind = raw.media_kind()?;
        let asset = CandidateAsset::from_raw(raw, kind);
        let mut asset = self.resolve(asset);

        if let Self::Folders(mode) = self {
            let folder = match mode {
                FolderAlbums::Off => None,
                FolderAlbums::Leaf => raw.parent_folder(),
                FolderAlbums::Top => raw.top_folder(),
            };
            if let Some(folder) = folder {
                asset.albums.insert(folder.to_string());
            }
        }
        Some(asset)
    }

    /// Apply the policy to an already-built candidate.
    pub fn resolve(&self, mut asset: CandidateAsset) -> CandidateAsset {
        if let Self::Fixed(album) = self {
            asset.albums.clear();
            asset.albums.insert(album.clone());
        }
        asset
    }
}
