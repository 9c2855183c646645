//! Capture-time lookup.
//!
//! [`created_time`] resolves when a local file was taken, preferring the
//! embedded EXIF capture time of images and falling back to the file's
//! modification time. Takeout sidecar timestamps take priority over both and
//! are applied by the matcher.

mod reader;

pub use reader::read_capture_time;

use crate::scan::MediaKind;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Best local guess at when a file was taken.
pub fn created_time(path: &Path, kind: MediaKind) -> Option<DateTime<Utc>> {
    if kind == MediaKind::Image {
        match read_capture_time(path) {
            Ok(Some(time)) => return Some(time),
            Ok(None) => {}
            Err(e) => log::debug!("Cannot read EXIF from {}: {e:#}", path.display()),
        }
    }
    modified_time(path)
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}
