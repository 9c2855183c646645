//! Google Takeout export handling.
//!
//! A Takeout export spreads a photo library over one or more archive parts.
//! Each media file may have a JSON sidecar, album folders carry a
//! `metadata.json` with the album title, and folder names may differ across
//! parts by the kind of whitespace they use. The [`TakeoutMatcher`] folds all
//! of that back into one list of [`CandidateAsset`](crate::asset::CandidateAsset)s:
//!
//! - folders are grouped by their whitespace-normalized path ([`normalize_whitespace`])
//! - untitled album folders ([`is_untitled_placeholder`]) produce no album unless kept
//! - partner-shared assets can be dropped or collected into a dedicated album
//! - a file present in several parts is uploaded once

mod matcher;
mod names;
mod sidecar;

pub use matcher::{MatchOutput, TakeoutMatcher};
pub use names::{is_untitled_placeholder, normalize_whitespace};
pub use sidecar::{AlbumMetadata, MatchIssue, MetadataSidecar, Sidecar, parse_sidecar, read_sidecar};

/// Knobs that only apply to Takeout exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeoutOptions {
    /// Name albums after their folder instead of the title in `metadata.json`.
    pub use_album_folder_as_name: bool,
    /// Turn untitled album folders into albums named after the folder.
    pub keep_untitled_albums: bool,
    /// Upload assets that came from partner sharing.
    pub keep_partner: bool,
    /// Extra album collecting every partner-shared asset.
    pub partner_album: Option<String>,
}

impl Default for TakeoutOptions {
    fn default() -> Self {
        Self {
            use_album_folder_as_name: false,
            keep_untitled_albums: false,
            keep_partner: true,
            partner_album: None,
        }
    }
}
