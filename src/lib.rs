//! # uplift
//!
//! Upload local photo folders and Google Takeout exports to an Immich-compatible
//! server, recreating albums along the way.
//!
//! ## Quick Start
//!
//! The pipeline module runs the whole scan → assign albums → upload flow:
//!
//! ```rust,no_run
//! use uplift::config::{Config, UploadOptions};
//! use uplift::pipeline;
//! use uplift::remote::HttpClient;
//! use tokio_util::sync::CancellationToken;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Server URL, API key and upload options
//!     let config = Config::load(Some("uplift.json".as_ref()))?;
//!     let client = HttpClient::new(&config.server)?;
//!
//!     let roots = [PathBuf::from("./Takeout")];
//!     let options = UploadOptions {
//!         google_photos: true,
//!         ..config.upload
//!     };
//!
//!     let report = pipeline::run(&client, &roots, &options, CancellationToken::new()).await?;
//!     println!("{} uploaded, {} failed", report.uploaded(), report.failed());
//!     for (name, album) in &report.albums {
//!         println!("  {name}: {} assets", album.members.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Trying it without a server
//!
//! [`remote::MemoryClient`] implements the same [`remote::RemoteClient`] trait
//! in memory, so a run can be inspected before anything is sent:
//!
//! ```rust,no_run
//! use uplift::config::UploadOptions;
//! use uplift::pipeline;
//! use uplift::remote::MemoryClient;
//! use tokio_util::sync::CancellationToken;
//! use std::path::PathBuf;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = MemoryClient::new();
//! let mut options = UploadOptions::default();
//! options.set_create_album_folder(true);
//!
//! pipeline::run(&client, &[PathBuf::from("./photos")], &options, CancellationToken::new()).await?;
//! for (album, members) in client.album_members().await {
//!     println!("{album}: {members:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Album rules
//!
//! | Mode | Albums |
//! |------|--------|
//! | Folders, `album` set | Every asset in that one album |
//! | Folders, `folder_albums = leaf` | Immediate parent folder name |
//! | Folders, `folder_albums = top` | First folder below the root |
//! | Google Takeout | Title from the folder's `metadata.json`, or the folder name with `use_album_folder_as_name` |
//!
//! Untitled Takeout albums are dropped unless `keep_untitled_albums` is set.
//! Partner-shared assets can be dropped (`keep_partner = false`) or gathered
//! in a `partner_album`.
//!
//! ## Modules
//!
//! - [`scan`]: Walking input roots
//! - [`takeout`]: Sidecar matching and album detection for Takeout exports
//! - [`policy`]: Album assignment for plain folders
//! - [`upload`]: Concurrent upload and album membership, run report
//! - [`remote`]: Server trait, HTTP client and in-memory client
//! - [`pipeline`]: Discovery plus upload in one call
//! - [`config`]: Configuration types and loading/saving

pub mod asset;
pub mod config;
pub mod exif;
pub mod pipeline;
pub mod policy;
pub mod remote;
pub mod scan;
pub mod shutdown;
pub mod takeout;
pub mod upload;
