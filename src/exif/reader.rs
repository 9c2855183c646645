use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use nom_exif::*;
use std::path::Path;

/// Formats `EntryValue` renders capture times in, tried in order.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Read the capture time recorded in an image's EXIF block.
///
/// Tries `DateTimeOriginal`, then `CreateDate`, then `ModifyDate`. Times
/// without an offset are taken as UTC. Returns `Ok(None)` when the file has
/// no EXIF data or none of the tags parse.
pub fn read_capture_time(path: &Path) -> Result<Option<DateTime<Utc>>> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path).context("Failed to open image file")?;

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("No EXIF data found in {}", path.display());
            return Ok(None);
        }
    };
    let exif: Exif = iter.into();

    for tag in [ExifTag::DateTimeOriginal, ExifTag::CreateDate, ExifTag::ModifyDate] {
        if let Some(time) = exif.get(tag).and_then(entry_to_time) {
            return Ok(Some(time));
        }
    }
    Ok(None)
}

/// Convert an EntryValue to a UTC timestamp.
fn entry_to_time(val: &EntryValue) -> Option<DateTime<Utc>> {
    let s = val.to_string();
    parse_exif_time(s.trim().trim_matches('"'))
}

pub(crate) fn parse_exif_time(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Some(time.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
