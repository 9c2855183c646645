//! Name handling for Takeout exports: whitespace folding, untitled folder
//! detection, and the file naming rules Google uses for sidecars.

/// Placeholder names Google gives albums that were never titled.
const UNTITLED_PLACEHOLDERS: &[&str] = &[
    "Untitled",
    "Sans titre",
    "Ohne Titel",
    "Sin título",
    "Senza titolo",
    "Sem título",
    "Zonder titel",
];

/// Suffixes Google appends to edited copies, per export locale.
const EDITED_SUFFIXES: &[&str] = &["-edited", "-modifié", "-bearbeitet", "-editado", "-modificato"];

const SUPPLEMENTAL: &str = ".supplemental-metadata";

/// Sidecar names that were cut short below this length are not trusted to
/// identify a media file.
const MIN_TRUNCATED_LEN: usize = 40;

/// Collapse every run of Unicode whitespace (non-breaking spaces included)
/// into a single ASCII space and trim the ends.
///
/// ```rust
/// use uplift::takeout::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("Google\u{a0}Photos"), "Google Photos");
/// assert_eq!(normalize_whitespace("  Trip \u{202f} 2023 "), "Trip 2023");
/// ```
pub fn normalize_whitespace(s: &str) -> String {
    s.split(char::is_whitespace)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a folder or album title is one of Google's untitled placeholders,
/// optionally followed by a counter such as `(9)`.
pub fn is_untitled_placeholder(name: &str) -> bool {
    let name = normalize_whitespace(name);
    let (base, _) = split_counter(&name);
    let base = base.trim_end();
    UNTITLED_PLACEHOLDERS
        .iter()
        .any(|placeholder| base.to_lowercase() == placeholder.to_lowercase())
}

/// Split a trailing `(N)` counter off a name: `"IMG(2)"` gives
/// `("IMG", Some("2"))`.
fn split_counter(s: &str) -> (&str, Option<&str>) {
    let Some(rest) = s.strip_suffix(')') else {
        return (s, None);
    };
    let Some(open) = rest.rfind('(') else {
        return (s, None);
    };
    let digits = &rest[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (s, None);
    }
    (&rest[..open], Some(digits))
}

/// Split a file name at its last dot.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    }
}

fn join_extension(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Sidecar names Google may have written for a media file, most likely first.
pub(crate) fn sidecar_candidates(name: &str) -> Vec<String> {
    let mut out = vec![
        format!("{name}.json"),
        format!("{name}{SUPPLEMENTAL}.json"),
    ];

    let (stem, ext) = split_extension(name);

    // `IMG(1).jpg` keeps its counter after the extension: `IMG.jpg(1).json`.
    if let (base, Some(n)) = split_counter(stem) {
        let original = join_extension(base, ext);
        out.push(format!("{original}({n}).json"));
        out.push(format!("{original}{SUPPLEMENTAL}({n}).json"));
    }

    // Edited copies have no sidecar of their own.
    for suffix in EDITED_SUFFIXES {
        if let Some(base) = stem.strip_suffix(suffix) {
            let original = join_extension(base, ext);
            out.push(format!("{original}.json"));
            out.push(format!("{original}{SUPPLEMENTAL}.json"));
        }
    }
    out
}

/// Whether `sidecar` is a length-truncated sidecar name for `name`.
pub(crate) fn is_truncated_sidecar(name: &str, sidecar: &str) -> bool {
    let Some(stem) = sidecar.strip_suffix(".json") else {
        return false;
    };
    let full = format!("{name}{SUPPLEMENTAL}");
    if stem == name || !full.starts_with(stem) {
        return false;
    }
    stem.starts_with(name) || stem.chars().count() >= MIN_TRUNCATED_LEN
}

/// Stem before the first dot: `PXL_1.MP.jpg` and `PXL_1.LS.mp4` both give
/// `PXL_1`. Used to pair live-photo videos with their still image.
pub(crate) fn base_stem(name: &str) -> &str {
    match name.find('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Album metadata files, as named by the various export locales.
pub(crate) fn is_album_metadata_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    let (stem, _) = split_counter(lower.strip_suffix(".json").unwrap_or(lower.as_str()));
    matches!(stem, "metadata" | "métadonnées" | "metadaten" | "metadatos" | "metadati")
}
